//! Per-endpoint poll loop.
//!
//! Each [`PoolMonitor`] owns one endpoint. Cycles run strictly one after the
//! other on a fixed interval; a failed cycle is logged and the next tick
//! starts a fresh one. Monitors never share mutable state with each other.

use super::reaper::{AbsenceReaper, ReapSummary};
use crate::engine::event_bus::EventBus;
use crate::state::{StateError, StateTracker};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::instrument;
use txwatch_poller::{PollError, PollerService};
use txwatch_types::{truncate_id, MonitorEvent, PollEvent, TxHash};

/// Counts from one successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
	pub pending: usize,
	pub queued: usize,
	pub upserted: usize,
	pub malformed: usize,
	pub reaped: ReapSummary,
}

pub struct PoolMonitor {
	poller: Arc<PollerService>,
	state: Arc<StateTracker>,
	event_bus: EventBus,
	reaper: Option<AbsenceReaper>,
	interval: Duration,
}

impl PoolMonitor {
	pub fn new(
		poller: Arc<PollerService>,
		state: Arc<StateTracker>,
		event_bus: EventBus,
		reaper_enabled: bool,
		interval: Duration,
	) -> Self {
		Self {
			poller,
			state,
			event_bus,
			reaper: reaper_enabled.then(AbsenceReaper::new),
			interval,
		}
	}

	fn publish(&self, event: PollEvent) {
		self.event_bus.publish(MonitorEvent::Poll(event)).ok();
	}

	/// Polls on every tick until `shutdown` turns true or its sender is dropped.
	///
	/// Shutdown is observed between cycles. A cycle in flight finishes or
	/// times out first.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tracing::info!(client = %self.poller.client(), interval_ms = self.interval.as_millis() as u64, "Poller started");

		loop {
			if *shutdown.borrow() {
				break;
			}
			tokio::select! {
				_ = ticker.tick() => {
					let _ = self.cycle().await;
				}
				_ = shutdown.changed() => break,
			}
		}

		tracing::info!(client = %self.poller.client(), "Poller stopped");
	}

	/// Runs one fetch-normalize-upsert cycle.
	#[instrument(skip_all, fields(client = %self.poller.client()))]
	pub async fn cycle(&mut self) -> Result<CycleSummary, PollError> {
		let client = self.poller.client().clone();

		let snapshot = match self.poller.poll().await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				tracing::warn!(error = %e, "Poll cycle failed");
				self.publish(PollEvent::CycleFailed {
					client,
					reason: e.to_string(),
				});
				return Err(e);
			},
		};

		for skipped in &snapshot.skipped {
			self.publish(PollEvent::RecordMalformed {
				client: client.clone(),
				bucket: skipped.bucket,
				address: skipped.address.clone(),
				nonce: skipped.nonce.clone(),
				reason: skipped.error.to_string(),
			});
		}

		let mut summary = CycleSummary {
			pending: snapshot.pending,
			queued: snapshot.queued,
			malformed: snapshot.skipped.len(),
			..Default::default()
		};

		for normalized in &snapshot.transactions {
			if let Some(classification) = &normalized.classification {
				tracing::warn!(
					tx_hash = %truncate_id(&normalized.hash.to_string()),
					reported_type = %classification.reported_type,
					classified_as = %classification.classified_as.as_str(),
					"Unknown transaction type, classified by fallback"
				);
				self.publish(PollEvent::Classified {
					client: client.clone(),
					hash: normalized.hash,
					reported_type: classification.reported_type.clone(),
					classified_as: classification.classified_as,
				});
			}

			let result = self
				.state
				.upsert_at(
					&client,
					normalized.hash,
					&normalized.tx,
					normalized.observation(),
					normalized.metadata.time_received,
				)
				.await;
			match result {
				Ok(_) => summary.upserted += 1,
				Err(StateError::TransitionRejected { from, to }) => {
					tracing::debug!(
						tx_hash = %truncate_id(&normalized.hash.to_string()),
						from = %from,
						to = %to,
						"Ignoring observation of a finished transaction"
					);
				},
				Err(e) => {
					tracing::error!(
						tx_hash = %truncate_id(&normalized.hash.to_string()),
						error = %e,
						"Failed to record observation"
					);
				},
			}
		}

		if let Some(reaper) = self.reaper.as_mut() {
			let current: HashSet<TxHash> = snapshot.hashes().collect();
			summary.reaped = reaper.rotate(current, &self.poller, &self.state).await;
		}

		tracing::debug!(
			pending = summary.pending,
			queued = summary.queued,
			upserted = summary.upserted,
			malformed = summary.malformed,
			mined = summary.reaped.mined,
			dropped = summary.reaped.dropped,
			"Poll cycle completed"
		);
		self.publish(PollEvent::CycleCompleted {
			client,
			pending: summary.pending,
			queued: summary.queued,
			upserted: summary.upserted,
			malformed: summary.malformed,
		});

		Ok(summary)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::tests::tracker_on;
	use async_trait::async_trait;
	use serde_json::{json, Value};
	use std::collections::BTreeMap;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use txwatch_poller::{Normalizer, PoolSource};
	use txwatch_types::{
		ClientId, ConfigSchema, MineStatus, MinedInfo, NodeBucket, PoolContent, Schema, TxStatus,
		ValidationError,
	};

	const SENDER: &str = "0x1111111111111111111111111111111111111111";

	fn hash_of(n: u64) -> TxHash {
		format!("{:#066x}", n).parse().unwrap()
	}

	fn node_tx(n: u64, nonce: u64) -> Value {
		json!({
			"hash": format!("{:#066x}", n),
			"from": SENDER,
			"to": "0x2222222222222222222222222222222222222222",
			"nonce": format!("{:#x}", nonce),
			"gas": "0x5208",
			"value": "0x0",
			"input": "0x",
			"type": "0x0",
			"gasPrice": "0x3b9aca00"
		})
	}

	fn pending(txs: impl IntoIterator<Item = (u64, Value)>) -> PoolContent {
		let by_nonce = txs.into_iter().map(|(n, v)| (n.to_string(), v)).collect();
		let bucket: NodeBucket = BTreeMap::from([(SENDER.to_string(), by_nonce)]);
		PoolContent {
			pending: bucket,
			queued: Default::default(),
		}
	}

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Replays scripted pool responses; the last one repeats.
	struct ScriptedSource {
		responses: Mutex<Vec<Result<PoolContent, String>>>,
		receipts: BTreeMap<TxHash, MinedInfo>,
		fetches: Arc<AtomicUsize>,
	}

	impl ScriptedSource {
		fn new(responses: Vec<Result<PoolContent, String>>) -> Self {
			Self {
				responses: Mutex::new(responses),
				receipts: BTreeMap::new(),
				fetches: Arc::new(AtomicUsize::new(0)),
			}
		}
	}

	#[async_trait]
	impl PoolSource for ScriptedSource {
		async fn fetch_pool(&self) -> Result<PoolContent, PollError> {
			self.fetches.fetch_add(1, Ordering::SeqCst);
			let mut responses = self.responses.lock().unwrap();
			let next = if responses.len() > 1 {
				responses.remove(0)
			} else {
				responses.first().cloned().unwrap_or_else(|| Ok(PoolContent::default()))
			};
			next.map_err(PollError::Network)
		}

		async fn receipt(&self, hash: TxHash) -> Result<Option<MinedInfo>, PollError> {
			Ok(self.receipts.get(&hash).cloned())
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}
	}

	fn setup() -> (Arc<StateTracker>, EventBus) {
		let bus = EventBus::new(1024);
		(Arc::new(tracker_on(bus.clone())), bus)
	}

	fn monitor(
		source: ScriptedSource,
		state: Arc<StateTracker>,
		bus: EventBus,
		reaper: bool,
	) -> PoolMonitor {
		let poller = PollerService::new(
			ClientId::from("geth"),
			Box::new(source),
			Normalizer::default(),
			Duration::from_secs(1),
		);
		PoolMonitor::new(Arc::new(poller), state, bus, reaper, Duration::from_secs(2))
	}

	#[tokio::test]
	async fn test_malformed_record_is_isolated() {
		let mut txs: Vec<(u64, Value)> = (0..100).map(|n| (n, node_tx(n + 1, n))).collect();
		let mut broken = node_tx(500, 100);
		broken["nonce"] = json!("zz");
		txs.push((100, broken));

		let (state, bus) = setup();
		let mut events = bus.subscribe();
		let mut monitor = monitor(
			ScriptedSource::new(vec![Ok(pending(txs))]),
			state.clone(),
			bus,
			false,
		);

		let summary = monitor.cycle().await.unwrap();
		assert_eq!(summary.upserted, 100);
		assert_eq!(summary.malformed, 1);
		assert_eq!(summary.pending, 101);

		let mut malformed = 0;
		let mut created = 0;
		let mut completed = false;
		while let Ok(event) = events.try_recv() {
			match event {
				MonitorEvent::Poll(PollEvent::RecordMalformed { nonce, .. }) => {
					assert_eq!(nonce, "100");
					malformed += 1;
				},
				MonitorEvent::State(_) => created += 1,
				MonitorEvent::Poll(PollEvent::CycleCompleted { upserted, .. }) => {
					assert_eq!(upserted, 100);
					completed = true;
				},
				_ => {},
			}
		}
		assert_eq!(malformed, 1);
		assert_eq!(created, 100);
		assert!(completed);
		assert!(!state.is_known(&hash_of(500)).await.unwrap());
	}

	#[tokio::test]
	async fn test_unknown_type_is_classified() {
		let mut odd = node_tx(1, 0);
		odd["type"] = json!("0x7e");

		let (state, bus) = setup();
		let mut events = bus.subscribe();
		let mut monitor = monitor(
			ScriptedSource::new(vec![Ok(pending([(0, odd)]))]),
			state,
			bus,
			false,
		);
		monitor.cycle().await.unwrap();

		let mut classified = false;
		while let Ok(event) = events.try_recv() {
			if let MonitorEvent::Poll(PollEvent::Classified { reported_type, .. }) = event {
				assert_eq!(reported_type, "0x7e");
				classified = true;
			}
		}
		assert!(classified);
	}

	#[tokio::test]
	async fn test_reaper_resolves_vanished_hashes() {
		let (state, bus) = setup();
		let mut source = ScriptedSource::new(vec![
			Ok(pending([(0, node_tx(1, 0)), (1, node_tx(2, 1)), (2, node_tx(3, 2))])),
			Err("connection reset".into()),
			Ok(pending([(2, node_tx(3, 2))])),
		]);
		source.receipts.insert(
			hash_of(1),
			MinedInfo {
				block_number: 77,
				block_hash: TxHash::repeat_byte(0xbb),
				gas_used: 21_000,
				status: Some(MineStatus::Success),
			},
		);
		let mut monitor = monitor(source, state.clone(), bus, true);
		let client = ClientId::from("geth");

		monitor.cycle().await.unwrap();
		// A failed cycle must not count as absence.
		assert!(monitor.cycle().await.is_err());
		for n in 1..=3 {
			let record = state.get_for_client(&hash_of(n), &client).await.unwrap().unwrap();
			assert_eq!(record.metadata.status, TxStatus::Pending);
		}

		let summary = monitor.cycle().await.unwrap();
		assert_eq!(summary.reaped.mined, 1);
		assert_eq!(summary.reaped.dropped, 1);

		let first = state.get_for_client(&hash_of(1), &client).await.unwrap().unwrap();
		assert_eq!(first.metadata.status, TxStatus::Mined);
		assert_eq!(first.metadata.block_number, Some(77));
		let second = state.get_for_client(&hash_of(2), &client).await.unwrap().unwrap();
		assert_eq!(second.metadata.status, TxStatus::Dropped);
		let third = state.get_for_client(&hash_of(3), &client).await.unwrap().unwrap();
		assert_eq!(third.metadata.status, TxStatus::Pending);
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_stops_on_shutdown() {
		let (state, bus) = setup();
		let source = ScriptedSource::new(vec![Ok(pending([(0, node_tx(1, 0))]))]);
		let fetches = source.fetches.clone();
		let monitor = monitor(source, state.clone(), bus, true);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		let handle = tokio::spawn(monitor.run(shutdown_rx));
		tokio::time::sleep(Duration::from_secs(5)).await;
		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();

		// Ticks at 0s, 2s and 4s.
		assert_eq!(fetches.load(Ordering::SeqCst), 3);
		assert!(state.is_known(&hash_of(1)).await.unwrap());
	}
}
