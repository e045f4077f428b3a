//! Beacon-node event stream source.
//!
//! Subscribes to `/eth/v1/events?topics=inclusion_list` and forwards every
//! decoded announcement. The connection is re-established after a fixed delay
//! whenever the stream ends or fails.

use crate::decode::{decode_announcement, SseDecoder};
use crate::{AnnouncementError, AnnouncementSource};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use txwatch_types::{ConfigSchema, Field, FieldType, InclusionAnnouncement, Schema, ValidationError};

const TOPIC: &str = "inclusion_list";

pub struct BeaconAnnouncementSource {
	client: reqwest::Client,
	events_url: reqwest::Url,
	reconnect_delay: Duration,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl BeaconAnnouncementSource {
	pub fn new(beacon_url: &str, reconnect_delay: Duration) -> Result<Self, AnnouncementError> {
		let mut base = beacon_url.parse::<reqwest::Url>().map_err(|e| {
			AnnouncementError::Configuration(format!("Invalid beacon url '{}': {}", beacon_url, e))
		})?;
		// The events path is relative to any path prefix on the beacon url.
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		let mut events_url = base
			.join("eth/v1/events")
			.map_err(|e| AnnouncementError::Configuration(e.to_string()))?;
		events_url.query_pairs_mut().append_pair("topics", TOPIC);

		Ok(Self {
			client: reqwest::Client::new(),
			events_url,
			reconnect_delay,
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
		})
	}

	/// Reads one connection until it ends. Returns an error if it could not be opened.
	async fn stream_once(
		client: &reqwest::Client,
		url: &reqwest::Url,
		sender: &mpsc::UnboundedSender<InclusionAnnouncement>,
	) -> Result<(), AnnouncementError> {
		let response = client
			.get(url.clone())
			.header(reqwest::header::ACCEPT, "text/event-stream")
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| AnnouncementError::Connection(e.to_string()))?;
		tracing::info!(url = %url, "Subscribed to inclusion list events");

		let mut decoder = SseDecoder::new();
		let mut body = response.bytes_stream();
		while let Some(chunk) = body.next().await {
			let chunk = chunk.map_err(|e| AnnouncementError::Connection(e.to_string()))?;
			for event in decoder.push(&chunk) {
				if event.event.as_deref().is_some_and(|name| name != TOPIC) {
					continue;
				}
				match decode_announcement(&event.data) {
					Ok(announcement) => {
						if sender.send(announcement).is_err() {
							// Receiver gone; nothing left to deliver to.
							return Ok(());
						}
					},
					Err(e) => tracing::warn!(error = %e, "Skipping undecodable inclusion list event"),
				}
			}
		}
		Ok(())
	}

	async fn monitoring_loop(
		client: reqwest::Client,
		url: reqwest::Url,
		reconnect_delay: Duration,
		sender: mpsc::UnboundedSender<InclusionAnnouncement>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		loop {
			tokio::select! {
				result = Self::stream_once(&client, &url, &sender) => {
					if let Err(e) = result {
						tracing::warn!(error = %e, "Inclusion list stream failed");
					}
					if sender.is_closed() {
						break;
					}
				}
				_ = stop_rx.recv() => break,
			}

			tokio::select! {
				_ = tokio::time::sleep(reconnect_delay) => {}
				_ = stop_rx.recv() => break,
			}
		}
	}
}

#[async_trait]
impl AnnouncementSource for BeaconAnnouncementSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BeaconSourceSchema)
	}

	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<InclusionAnnouncement>,
	) -> Result<(), AnnouncementError> {
		if self.is_monitoring.swap(true, Ordering::SeqCst) {
			return Err(AnnouncementError::AlreadyMonitoring);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let client = self.client.clone();
		let url = self.events_url.clone();
		let reconnect_delay = self.reconnect_delay;
		tokio::spawn(async move {
			Self::monitoring_loop(client, url, reconnect_delay, sender, stop_rx).await;
		});

		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), AnnouncementError> {
		if !self.is_monitoring.swap(false, Ordering::SeqCst) {
			return Ok(());
		}
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}
		Ok(())
	}
}

pub struct BeaconSourceSchema;

impl ConfigSchema for BeaconSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("beacon_url", FieldType::Url)],
			vec![Field::new(
				"reconnect_delay_ms",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

/// Creates a beacon announcement source.
///
/// Configuration parameters:
/// - `beacon_url` (required): beacon node HTTP API base URL
/// - `reconnect_delay_ms` (optional): delay before reconnecting (default: 1000)
pub fn create_source(
	config: &toml::Value,
) -> Result<Box<dyn AnnouncementSource>, AnnouncementError> {
	BeaconSourceSchema
		.validate(config)
		.map_err(|e| AnnouncementError::Configuration(e.to_string()))?;

	let beacon_url = config
		.get("beacon_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AnnouncementError::Configuration("beacon_url is required".into()))?;
	let reconnect_delay = config
		.get("reconnect_delay_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| Duration::from_millis(ms as u64))
		.unwrap_or(Duration::from_millis(1_000));

	Ok(Box::new(BeaconAnnouncementSource::new(
		beacon_url,
		reconnect_delay,
	)?))
}

pub struct Registry;

impl txwatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "beacon";
	type Factory = crate::AnnouncementFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::AnnouncementRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_events_url() {
		let source =
			BeaconAnnouncementSource::new("http://localhost:5052", Duration::from_secs(1)).unwrap();
		assert_eq!(
			source.events_url.as_str(),
			"http://localhost:5052/eth/v1/events?topics=inclusion_list"
		);

		for url in ["https://gateway.example/beacon", "https://gateway.example/beacon/"] {
			let source = BeaconAnnouncementSource::new(url, Duration::from_secs(1)).unwrap();
			assert_eq!(
				source.events_url.as_str(),
				"https://gateway.example/beacon/eth/v1/events?topics=inclusion_list"
			);
		}
	}

	#[test]
	fn test_factory_validates() {
		let missing: toml::Value = toml::from_str("reconnect_delay_ms = 10").unwrap();
		assert!(create_source(&missing).is_err());

		let bad: toml::Value = toml::from_str(r#"beacon_url = "ws://node""#).unwrap();
		assert!(create_source(&bad).is_err());
	}

	#[tokio::test]
	async fn test_stop_ends_reconnect_loop() {
		// Nothing listens on port 9; every connection attempt fails fast.
		let source =
			BeaconAnnouncementSource::new("http://127.0.0.1:9", Duration::from_secs(60)).unwrap();
		let (tx, _rx) = mpsc::unbounded_channel();

		source.start_monitoring(tx.clone()).await.unwrap();
		assert!(matches!(
			source.start_monitoring(tx).await,
			Err(AnnouncementError::AlreadyMonitoring)
		));
		source.stop_monitoring().await.unwrap();
		assert!(!source.is_monitoring.load(Ordering::SeqCst));
	}
}
