//! Event types for observability and inter-service communication.
//!
//! Events are published on a broadcast bus by the engine. Nothing in the core
//! depends on an event being consumed.

use crate::{ClientId, InclusionSummary, PoolBucket, TxHash, TxStatus, TxType};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all monitor events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
	/// Events from the pollers.
	Poll(PollEvent),
	/// Events from the state tracker.
	State(StateEvent),
	/// Events from the inclusion reconciler.
	Inclusion(InclusionEvent),
}

/// Events related to polling endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PollEvent {
	/// A poll cycle finished and its records were handed to the tracker.
	CycleCompleted {
		client: ClientId,
		pending: usize,
		queued: usize,
		upserted: usize,
		malformed: usize,
	},
	/// A poll cycle failed or timed out; the poller keeps running.
	CycleFailed { client: ClientId, reason: String },
	/// A single record could not be normalized and was skipped.
	RecordMalformed {
		client: ClientId,
		bucket: PoolBucket,
		address: String,
		nonce: String,
		reason: String,
	},
	/// A record with an unknown type tag was classified by fallback.
	Classified {
		client: ClientId,
		hash: TxHash,
		reported_type: String,
		classified_as: TxType,
	},
}

/// Events related to lifecycle tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateEvent {
	Created {
		client: ClientId,
		hash: TxHash,
		status: TxStatus,
	},
	Transitioned {
		client: ClientId,
		hash: TxHash,
		from: TxStatus,
		to: TxStatus,
	},
	Rejected {
		client: ClientId,
		hash: TxHash,
		from: TxStatus,
		to: TxStatus,
	},
}

/// Events related to inclusion-list reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InclusionEvent {
	ReportFinalized {
		slot: u64,
		sequence: u32,
		summary: InclusionSummary,
	},
	AnnouncementRejected { reason: String },
}
