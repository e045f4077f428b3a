//! Monitor engine that runs every endpoint poller and the inclusion reconciler.
//!
//! The engine owns the shared services and hands each long-running unit its
//! own task. A single watch channel carries the shutdown signal to all of them.

pub mod event_bus;

use crate::diff::DiffEngine;
use crate::inclusion::InclusionReconciler;
use crate::monitoring::PoolMonitor;
use crate::state::StateTracker;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use txwatch_config::Config;
use txwatch_inclusion::InclusionService;
use txwatch_poller::PollerService;
use txwatch_storage::StorageService;

/// Errors that can occur while the engine is running.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

#[derive(Clone)]
pub struct MonitorEngine {
	/// Monitor configuration.
	pub(crate) config: Config,
	/// Storage shared by the tracker and the reconciler.
	pub(crate) storage: Arc<StorageService>,
	/// Sole writer of transaction state.
	pub(crate) state: Arc<StateTracker>,
	pub(crate) diff: Arc<DiffEngine>,
	pub(crate) reconciler: Arc<InclusionReconciler>,
	/// One per configured endpoint.
	pub(crate) pollers: Vec<Arc<PollerService>>,
	/// Announcement source, when inclusion monitoring is enabled.
	pub(crate) inclusion: Option<Arc<InclusionService>>,
	pub(crate) event_bus: event_bus::EventBus,
}

impl MonitorEngine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		state: Arc<StateTracker>,
		diff: Arc<DiffEngine>,
		reconciler: Arc<InclusionReconciler>,
		pollers: Vec<Arc<PollerService>>,
		inclusion: Option<Arc<InclusionService>>,
		event_bus: event_bus::EventBus,
	) -> Self {
		Self {
			config,
			storage,
			state,
			diff,
			reconciler,
			pollers,
			inclusion,
			event_bus,
		}
	}

	/// Runs until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Runs every poller and the reconciler until `signal` completes.
	pub async fn run_until<F>(&self, signal: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let mut tasks = JoinSet::new();

		for poller in &self.pollers {
			let monitor = PoolMonitor::new(
				poller.clone(),
				self.state.clone(),
				self.event_bus.clone(),
				self.config.reaper.enabled,
				self.config.polling.interval(),
			);
			tasks.spawn(monitor.run(shutdown_rx.clone()));
		}

		if let Some(inclusion) = &self.inclusion {
			let (announcement_tx, announcement_rx) = mpsc::unbounded_channel();
			inclusion
				.start(announcement_tx)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
			let reconciler = self.reconciler.clone();
			let shutdown = shutdown_rx.clone();
			tasks.spawn(async move { reconciler.run(announcement_rx, shutdown).await });
		}

		// Start storage cleanup task
		let storage = self.storage.clone();
		let mut cleanup_shutdown = shutdown_rx.clone();
		let cleanup_every = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		tasks.spawn(async move {
			let mut interval = tokio::time::interval(cleanup_every);
			loop {
				tokio::select! {
					_ = interval.tick() => match storage.cleanup_expired().await {
						Ok(count) if count > 0 => {
							tracing::debug!(removed = count, "Storage cleanup");
						},
						Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
						_ => {},
					},
					_ = cleanup_shutdown.changed() => break,
				}
			}
		});

		tracing::info!(
			monitor_id = %self.config.monitor.id,
			endpoints = self.pollers.len(),
			inclusion = self.inclusion.is_some(),
			"Monitor running"
		);

		signal.await;
		tracing::info!("Shutting down");
		shutdown_tx.send_replace(true);

		if let Some(inclusion) = &self.inclusion {
			if let Err(e) = inclusion.stop().await {
				tracing::warn!(error = %e, "Failed to stop announcement source");
			}
		}

		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				tracing::error!(error = %e, "Monitor task panicked");
			}
		}

		Ok(())
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn state(&self) -> &Arc<StateTracker> {
		&self.state
	}

	pub fn diff(&self) -> &Arc<DiffEngine> {
		&self.diff
	}

	pub fn reconciler(&self) -> &Arc<InclusionReconciler> {
		&self.reconciler
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}
}
