//! Inclusion-list reconciliation.
//!
//! Each announcement is checked against the state tracker once and turned
//! into an immutable [`InclusionReport`]. Reports are stored under
//! `<slot>:<sequence>` with zero-padded components so key order is slot order.

use crate::engine::event_bus::EventBus;
use crate::state::StateTracker;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::instrument;
use txwatch_storage::StorageService;
use txwatch_types::{
	current_timestamp_millis, InclusionAnnouncement, InclusionEvent, InclusionReport,
	InclusionSummary, MonitorEvent, StorageKey, TxHash,
};

#[derive(Debug, Error)]
pub enum InclusionError {
	#[error("Invalid announcement: {0}")]
	InvalidAnnouncement(String),
	#[error("State error: {0}")]
	State(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

fn slot_prefix(slot: u64) -> String {
	format!("{:020}:", slot)
}

fn report_id(slot: u64, sequence: u32) -> String {
	format!("{:020}:{:06}", slot, sequence)
}

pub struct InclusionReconciler {
	state: Arc<StateTracker>,
	storage: Arc<StorageService>,
	event_bus: EventBus,
	/// Serializes sequence assignment.
	write_lock: Mutex<()>,
}

impl InclusionReconciler {
	pub fn new(state: Arc<StateTracker>, storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self {
			state,
			storage,
			event_bus,
			write_lock: Mutex::new(()),
		}
	}

	/// Reconciles one announcement and stores its report.
	///
	/// The report is written in a single storage call after every hash has
	/// been checked, so an abandoned call leaves nothing behind.
	#[instrument(skip_all, fields(slot = ?announcement.slot))]
	pub async fn process(
		&self,
		announcement: InclusionAnnouncement,
	) -> Result<InclusionReport, InclusionError> {
		let slot = match self.validate(&announcement) {
			Ok(slot) => slot,
			Err(e) => {
				tracing::warn!(error = %e, "Rejected inclusion list announcement");
				self.event_bus
					.publish(MonitorEvent::Inclusion(InclusionEvent::AnnouncementRejected {
						reason: e.to_string(),
					}))
					.ok();
				return Err(e);
			},
		};

		let mut included = Vec::new();
		let mut missing = Vec::new();
		for hash in unique_hashes(&announcement.transactions) {
			let known = self
				.state
				.is_known(&hash)
				.await
				.map_err(|e| InclusionError::State(e.to_string()))?;
			if known {
				included.push(hash);
			} else {
				missing.push(hash);
			}
		}

		let _guard = self.write_lock.lock().await;
		let sequence = self
			.latest_report(slot)
			.await?
			.map_or(0, |latest| latest.sequence + 1);

		let summary = InclusionSummary {
			total: included.len() + missing.len(),
			included: included.len(),
			missing: missing.len(),
		};
		let report = InclusionReport {
			slot,
			sequence,
			validator_index: announcement.validator_index,
			included,
			missing,
			summary,
			generated_at: current_timestamp_millis(),
		};
		self.storage
			.store(
				StorageKey::InclusionReports.as_str(),
				&report_id(slot, sequence),
				&report,
			)
			.await
			.map_err(|e| InclusionError::Storage(e.to_string()))?;

		tracing::info!(
			slot,
			sequence,
			total = summary.total,
			included = summary.included,
			missing = summary.missing,
			"Inclusion report finalized"
		);
		self.event_bus
			.publish(MonitorEvent::Inclusion(InclusionEvent::ReportFinalized {
				slot,
				sequence,
				summary,
			}))
			.ok();

		Ok(report)
	}

	fn validate(&self, announcement: &InclusionAnnouncement) -> Result<u64, InclusionError> {
		let slot = announcement
			.slot
			.ok_or_else(|| InclusionError::InvalidAnnouncement("missing slot".into()))?;
		if announcement.transactions.is_empty() {
			return Err(InclusionError::InvalidAnnouncement(format!(
				"empty transaction set for slot {}",
				slot
			)));
		}
		Ok(slot)
	}

	/// Processes announcements in receive order until the channel closes or
	/// shutdown is signalled.
	pub async fn run(
		&self,
		mut announcements: mpsc::UnboundedReceiver<InclusionAnnouncement>,
		mut shutdown: watch::Receiver<bool>,
	) {
		loop {
			if *shutdown.borrow() {
				break;
			}
			let announcement = tokio::select! {
				next = announcements.recv() => match next {
					Some(announcement) => announcement,
					None => break,
				},
				_ = shutdown.changed() => break,
			};

			tokio::select! {
				result = self.process(announcement) => {
					// Rejections and failures are already logged; keep going.
					if let Err(InclusionError::State(e) | InclusionError::Storage(e)) = result {
						tracing::error!(error = %e, "Failed to reconcile announcement");
					}
				}
				_ = shutdown.changed() => break,
			}
		}
		tracing::info!("Inclusion reconciler stopped");
	}

	/// Most recent report for `slot`.
	pub async fn latest_report(&self, slot: u64) -> Result<Option<InclusionReport>, InclusionError> {
		let reports: Vec<InclusionReport> = self
			.storage
			.list(StorageKey::InclusionReports.as_str(), &slot_prefix(slot))
			.await
			.map_err(|e| InclusionError::Storage(e.to_string()))?;
		Ok(reports.into_iter().last())
	}

	/// Every stored report in slot order, then sequence order.
	pub async fn reports(&self) -> Result<Vec<InclusionReport>, InclusionError> {
		self.storage
			.list(StorageKey::InclusionReports.as_str(), "")
			.await
			.map_err(|e| InclusionError::Storage(e.to_string()))
	}
}

/// Hashes in announcement order without duplicates.
pub fn unique_hashes(hashes: &[TxHash]) -> Vec<TxHash> {
	let mut seen = HashSet::new();
	hashes.iter().copied().filter(|h| seen.insert(*h)).collect()
}
