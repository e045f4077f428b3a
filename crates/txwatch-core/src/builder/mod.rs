//! Builder for assembling a [`MonitorEngine`] from configuration.
//!
//! Every pluggable component is created through a named factory. The caller
//! supplies the factory maps, usually from each crate's
//! `get_all_implementations()`, and the builder matches configured names
//! against them.

use crate::diff::DiffEngine;
use crate::engine::{event_bus::EventBus, MonitorEngine};
use crate::inclusion::InclusionReconciler;
use crate::state::StateTracker;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use txwatch_config::Config;
use txwatch_inclusion::{AnnouncementError, AnnouncementSource, InclusionService};
use txwatch_poller::{Normalizer, PollError, PollerService, PoolSource};
use txwatch_storage::{StorageError, StorageInterface, StorageService};
use txwatch_types::ClientId;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct MonitorFactories<SF, PF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub pool_source_factories: HashMap<String, PF>,
	pub announcement_factories: HashMap<String, AF>,
}

pub struct MonitorBuilder {
	config: Config,
}

impl MonitorBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, PF, AF>(
		self,
		factories: MonitorFactories<SF, PF, AF>,
	) -> Result<MonitorEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PoolSource>, PollError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AnnouncementSource>, AnnouncementError>,
	{
		// Only the primary storage is instantiated; the others are kept in
		// config so switching primaries is a one-line change.
		let primary = &self.config.storage.primary;
		let storage_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' is not configured", primary))
		})?;
		let storage_factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;
		let backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		backend.config_schema().validate(storage_config).map_err(|e| {
			BuilderError::Config(format!(
				"Invalid configuration for storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");
		let storage = Arc::new(StorageService::new(backend));

		let mut pollers = Vec::with_capacity(self.config.endpoints.len());
		for endpoint in &self.config.endpoints {
			let factory = factories
				.pool_source_factories
				.get(&endpoint.source)
				.ok_or_else(|| {
					BuilderError::MissingComponent(format!(
						"pool source '{}' for endpoint '{}'",
						endpoint.source, endpoint.name
					))
				})?;
			let settings = endpoint.settings_value();
			let source = factory(&settings).map_err(|e| {
				tracing::error!(
					component = "poller",
					implementation = %endpoint.source,
					endpoint = %endpoint.name,
					error = %e,
					"Failed to create pool source"
				);
				BuilderError::Config(format!(
					"Failed to create pool source for endpoint '{}': {}",
					endpoint.name, e
				))
			})?;

			source.config_schema().validate(&settings).map_err(|e| {
				BuilderError::Config(format!(
					"Invalid configuration for endpoint '{}': {}",
					endpoint.name, e
				))
			})?;

			let default_chain_id = settings
				.get("chain_id")
				.and_then(|v| v.as_integer())
				.map(|id| id as u64);
			pollers.push(Arc::new(PollerService::new(
				ClientId::new(endpoint.name.clone()),
				source,
				Normalizer::new(default_chain_id),
				self.config.polling.timeout(),
			)));
			tracing::info!(component = "poller", implementation = %endpoint.source, endpoint = %endpoint.name, "Loaded");
		}

		let inclusion = match self.config.inclusion.as_ref().filter(|c| c.enabled) {
			Some(inclusion_config) => {
				let factory = factories
					.announcement_factories
					.get(&inclusion_config.source)
					.ok_or_else(|| {
						BuilderError::MissingComponent(format!(
							"announcement source '{}'",
							inclusion_config.source
						))
					})?;
				let settings = inclusion_config.settings_value();
				let source = factory(&settings).map_err(|e| {
					tracing::error!(
						component = "inclusion",
						implementation = %inclusion_config.source,
						error = %e,
						"Failed to create announcement source"
					);
					BuilderError::Config(format!(
						"Failed to create announcement source '{}': {}",
						inclusion_config.source, e
					))
				})?;
				source.config_schema().validate(&settings).map_err(|e| {
					BuilderError::Config(format!(
						"Invalid configuration for announcement source '{}': {}",
						inclusion_config.source, e
					))
				})?;
				tracing::info!(component = "inclusion", implementation = %inclusion_config.source, "Loaded");
				Some(Arc::new(InclusionService::new(source)))
			},
			None => None,
		};

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let state = Arc::new(StateTracker::new(storage.clone(), event_bus.clone()));
		let diff = Arc::new(DiffEngine::new(state.clone()));
		let reconciler = Arc::new(InclusionReconciler::new(
			state.clone(),
			storage.clone(),
			event_bus.clone(),
		));

		Ok(MonitorEngine::new(
			self.config,
			storage,
			state,
			diff,
			reconciler,
			pollers,
			inclusion,
			event_bus,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use txwatch_config::{ConfigBuilder, InclusionConfig};
	use txwatch_types::{
		ConfigSchema, Field, FieldType, MinedInfo, PoolContent, Schema, TxHash, ValidationError,
	};

	/// Accepts any settings at construction but requires `depth` in its schema.
	struct DepthSource;

	struct DepthSchema;

	impl ConfigSchema for DepthSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(
				vec![Field::new(
					"depth",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				)],
				vec![],
			)
			.validate(config)
		}
	}

	#[async_trait]
	impl PoolSource for DepthSource {
		async fn fetch_pool(&self) -> Result<PoolContent, PollError> {
			Ok(PoolContent::default())
		}

		async fn receipt(&self, _hash: TxHash) -> Result<Option<MinedInfo>, PollError> {
			Ok(None)
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(DepthSchema)
		}
	}

	fn depth_source(_config: &toml::Value) -> Result<Box<dyn PoolSource>, PollError> {
		Ok(Box::new(DepthSource))
	}

	type Factories = MonitorFactories<
		txwatch_storage::StorageFactory,
		txwatch_poller::PoolSourceFactory,
		txwatch_inclusion::AnnouncementFactory,
	>;

	fn factories() -> Factories {
		MonitorFactories {
			storage_factories: txwatch_storage::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			pool_source_factories: txwatch_poller::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			announcement_factories: txwatch_inclusion::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		}
	}

	fn base() -> ConfigBuilder {
		ConfigBuilder::new()
			.endpoint("geth", "http://localhost:8545")
			.endpoint("reth", "http://localhost:8546")
	}

	#[test]
	fn test_builds_one_poller_per_endpoint() {
		let engine = MonitorBuilder::new(base().build())
			.build(factories())
			.unwrap();
		let clients: Vec<_> = engine.pollers.iter().map(|p| p.client().as_str()).collect();
		assert_eq!(clients, vec!["geth", "reth"]);
		assert!(engine.inclusion.is_none());
	}

	#[test]
	fn test_inclusion_source_is_built_when_enabled() {
		let mut settings = toml::Table::new();
		settings.insert(
			"beacon_url".into(),
			toml::Value::String("http://localhost:5052".into()),
		);
		let config = base()
			.inclusion(Some(InclusionConfig {
				enabled: true,
				source: "beacon".into(),
				settings,
			}))
			.build();

		let engine = MonitorBuilder::new(config).build(factories()).unwrap();
		assert!(engine.inclusion.is_some());
	}

	#[test]
	fn test_unknown_source_is_missing_component() {
		let mut config = base().build();
		config.endpoints[0].source = "websocket".into();

		let err = MonitorBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(m) if m.contains("websocket")));
	}

	#[test]
	fn test_invalid_endpoint_settings_fail() {
		let mut config = base().build();
		config.endpoints[1]
			.settings
			.insert("url".into(), toml::Value::String("not a url".into()));

		assert!(matches!(
			MonitorBuilder::new(config).build(factories()),
			Err(BuilderError::Config(_))
		));
	}

	#[test]
	fn test_source_schema_is_enforced() {
		let mut factories = factories();
		factories.pool_source_factories.insert(
			"depth".into(),
			depth_source as txwatch_poller::PoolSourceFactory,
		);

		let mut config = base().build();
		config.endpoints[0].source = "depth".into();
		let err = MonitorBuilder::new(config.clone())
			.build(factories)
			.err()
			.unwrap();
		assert!(matches!(err, BuilderError::Config(m) if m.contains("depth")));

		let mut factories = self::factories();
		factories.pool_source_factories.insert(
			"depth".into(),
			depth_source as txwatch_poller::PoolSourceFactory,
		);
		config.endpoints[0]
			.settings
			.insert("depth".into(), toml::Value::Integer(3));
		assert!(MonitorBuilder::new(config).build(factories).is_ok());
	}
}
