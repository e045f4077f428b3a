//! Fluent construction of `Config` values for tests and embedding.

use crate::{
	ApiConfig, Config, EndpointConfig, InclusionConfig, MonitorConfig, PollingConfig,
	ReaperConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances.
///
/// Defaults to a single in-memory storage backend, no endpoints and no API.
/// The result is not validated; use `Config::from_str` for that.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	monitor_id: String,
	polling: PollingConfig,
	endpoints: Vec<EndpointConfig>,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	inclusion: Option<InclusionConfig>,
	reaper_enabled: bool,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			monitor_id: "test-monitor".to_string(),
			polling: PollingConfig::default(),
			endpoints: Vec::new(),
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			inclusion: None,
			reaper_enabled: true,
			api: None,
		}
	}

	pub fn monitor_id(mut self, id: impl Into<String>) -> Self {
		self.monitor_id = id.into();
		self
	}

	pub fn polling(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
		self.polling = PollingConfig {
			interval_ms,
			timeout_ms,
		};
		self
	}

	/// Adds an RPC endpoint with the given name and URL.
	pub fn endpoint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
		let mut settings = toml::Table::new();
		settings.insert("url".to_string(), toml::Value::String(url.into()));
		self.endpoints.push(EndpointConfig {
			name: name.into(),
			source: "rpc".to_string(),
			settings,
		});
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	pub fn inclusion(mut self, inclusion: Option<InclusionConfig>) -> Self {
		self.inclusion = inclusion;
		self
	}

	pub fn reaper_enabled(mut self, enabled: bool) -> Self {
		self.reaper_enabled = enabled;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::Table::new()),
		);

		Config {
			monitor: MonitorConfig {
				id: self.monitor_id,
			},
			polling: self.polling,
			endpoints: self.endpoints,
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			inclusion: self.inclusion,
			reaper: ReaperConfig {
				enabled: self.reaper_enabled,
			},
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_passes_validation() {
		let config = ConfigBuilder::new()
			.monitor_id("built")
			.polling(500, 400)
			.endpoint("geth", "http://localhost:8545")
			.build();
		assert!(config.validate().is_ok());
		assert_eq!(config.endpoints[0].source, "rpc");
		assert!(config.storage.implementations.contains_key("memory"));
	}

	#[test]
	fn test_builder_without_endpoints_fails_validation() {
		assert!(ConfigBuilder::new().build().validate().is_err());
	}
}
