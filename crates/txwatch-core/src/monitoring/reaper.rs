//! Absence reaper.
//!
//! A transaction that leaves an endpoint's pool was either mined or dropped.
//! The reaper remembers the hashes of the previous successful cycle, asks the
//! endpoint for a receipt of every hash that disappeared, and reports the
//! verdict through the normal state-tracker transition rules.

use crate::state::{StateError, StateTracker, UpsertOutcome};
use std::collections::HashSet;
use txwatch_poller::PollerService;
use txwatch_types::{truncate_id, Observation, TxHash};

/// Counts from one reaping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
	pub mined: usize,
	pub dropped: usize,
	/// Receipt lookups that failed; retried on the next pass.
	pub deferred: usize,
}

#[derive(Debug, Default)]
pub struct AbsenceReaper {
	previous: HashSet<TxHash>,
}

impl AbsenceReaper {
	pub fn new() -> Self {
		Self::default()
	}

	/// Hashes that were present in `previous` but are gone from `current`.
	fn vanished(&self, current: &HashSet<TxHash>) -> Vec<TxHash> {
		let mut gone: Vec<TxHash> = self.previous.difference(current).copied().collect();
		gone.sort();
		gone
	}

	/// Resolves every vanished hash and remembers `current` for the next pass.
	///
	/// Only call this after a successful cycle. Hashes whose receipt lookup
	/// failed stay in the remembered set so they are retried.
	pub async fn rotate(
		&mut self,
		current: HashSet<TxHash>,
		poller: &PollerService,
		state: &StateTracker,
	) -> ReapSummary {
		let mut summary = ReapSummary::default();
		let mut carried = Vec::new();

		for hash in self.vanished(&current) {
			let verdict = match poller.receipt(hash).await {
				Ok(Some(info)) => Observation::Mined(info),
				Ok(None) => Observation::Dropped,
				Err(e) => {
					tracing::warn!(
						client = %poller.client(),
						tx_hash = %truncate_id(&hash.to_string()),
						error = %e,
						"Receipt lookup failed, will retry"
					);
					summary.deferred += 1;
					carried.push(hash);
					continue;
				},
			};
			let mined = matches!(verdict, Observation::Mined(_));

			match state.advance(poller.client(), hash, verdict).await {
				Ok(UpsertOutcome::Transitioned { .. }) if mined => summary.mined += 1,
				Ok(UpsertOutcome::Transitioned { .. }) => summary.dropped += 1,
				Ok(_) => {},
				// Already terminal or forgotten; nothing to report.
				Err(StateError::TransitionRejected { .. } | StateError::UnknownHash(_)) => {},
				Err(e) => {
					tracing::error!(
						client = %poller.client(),
						tx_hash = %truncate_id(&hash.to_string()),
						error = %e,
						"Failed to record absence verdict"
					);
					carried.push(hash);
				},
			}
		}

		self.previous = current;
		self.previous.extend(carried);
		summary
	}
}
