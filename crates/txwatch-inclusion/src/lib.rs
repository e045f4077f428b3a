//! Inclusion-list announcement sources.
//!
//! An [`AnnouncementSource`] pushes validator inclusion-list announcements,
//! in the order it receives them, into a channel supplied by the engine.
//! Signature validation is the source's concern; everything downstream treats
//! the announcement as authentic.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use txwatch_types::{ConfigSchema, ImplementationRegistry, InclusionAnnouncement};

pub mod decode;

pub mod implementations {
	pub mod beacon;
}

#[derive(Debug, Error)]
pub enum AnnouncementError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Already monitoring")]
	AlreadyMonitoring,
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

#[async_trait]
pub trait AnnouncementSource: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Starts delivering announcements to `sender` from a background task.
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<InclusionAnnouncement>,
	) -> Result<(), AnnouncementError>;

	async fn stop_monitoring(&self) -> Result<(), AnnouncementError>;
}

pub type AnnouncementFactory =
	fn(&toml::Value) -> Result<Box<dyn AnnouncementSource>, AnnouncementError>;

pub trait AnnouncementRegistry: ImplementationRegistry<Factory = AnnouncementFactory> {}

/// Get all registered announcement sources as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AnnouncementFactory)> {
	use implementations::beacon;

	vec![(beacon::Registry::NAME, beacon::Registry::factory())]
}

/// Owns the configured announcement source.
pub struct InclusionService {
	source: Box<dyn AnnouncementSource>,
}

impl InclusionService {
	pub fn new(source: Box<dyn AnnouncementSource>) -> Self {
		Self { source }
	}

	pub async fn start(
		&self,
		sender: mpsc::UnboundedSender<InclusionAnnouncement>,
	) -> Result<(), AnnouncementError> {
		self.source.start_monitoring(sender).await
	}

	pub async fn stop(&self) -> Result<(), AnnouncementError> {
		self.source.stop_monitoring().await
	}
}
