//! Lifecycle status and per-client metadata.

use crate::{ClientId, PoolBucket, Transaction, TxHash};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a transaction as seen by one client.
///
/// Statuses form a DAG: `received -> {pending, queued} -> {mined, dropped}`.
/// `mined` and `dropped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
	Received,
	Pending,
	Queued,
	Mined,
	Dropped,
}

impl TxStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Mined | Self::Dropped)
	}

	/// Depth of the status in the lifecycle DAG.
	pub fn rank(&self) -> u8 {
		match self {
			Self::Received => 0,
			Self::Pending | Self::Queued => 1,
			Self::Mined | Self::Dropped => 2,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Received => "received",
			Self::Pending => "pending",
			Self::Queued => "queued",
			Self::Mined => "mined",
			Self::Dropped => "dropped",
		}
	}
}

impl fmt::Display for TxStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Execution outcome taken from the receipt of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MineStatus {
	Failed,
	Success,
}

/// Inclusion data that must accompany a transition into `mined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedInfo {
	pub block_number: u64,
	pub block_hash: B256,
	pub gas_used: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<MineStatus>,
}

/// A status observation reported to the state tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
	Received,
	Pending,
	Queued,
	Mined(MinedInfo),
	Dropped,
}

impl Observation {
	pub fn status(&self) -> TxStatus {
		match self {
			Self::Received => TxStatus::Received,
			Self::Pending => TxStatus::Pending,
			Self::Queued => TxStatus::Queued,
			Self::Mined(_) => TxStatus::Mined,
			Self::Dropped => TxStatus::Dropped,
		}
	}
}

impl From<PoolBucket> for Observation {
	fn from(bucket: PoolBucket) -> Self {
		match bucket {
			PoolBucket::Pending => Self::Pending,
			PoolBucket::Queued => Self::Queued,
		}
	}
}

/// Names of the metadata fields that hold local wall-clock stamps.
pub const TIMESTAMP_FIELDS: [&str; 5] = [
	"time_received",
	"time_pending",
	"time_queued",
	"time_mined",
	"time_dropped",
];

/// Mutable per-(hash, client) lifecycle record. Timestamps are unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
	pub status: TxStatus,
	pub time_received: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_pending: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_queued: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_mined: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_dropped: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_number: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_hash: Option<B256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_used: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mine_status: Option<MineStatus>,
}

impl TransactionMetadata {
	/// Metadata for a first observation made at `now`.
	pub fn observed(observation: &Observation, now: u64) -> Self {
		let mut metadata = Self {
			status: TxStatus::Received,
			time_received: now,
			time_pending: None,
			time_queued: None,
			time_mined: None,
			time_dropped: None,
			block_number: None,
			block_hash: None,
			gas_used: None,
			mine_status: None,
		};
		metadata.advance(observation, now);
		metadata
	}

	/// Latest stamp across all statuses.
	pub fn last_stamp(&self) -> u64 {
		[
			self.time_pending,
			self.time_queued,
			self.time_mined,
			self.time_dropped,
		]
		.into_iter()
		.flatten()
		.fold(self.time_received, u64::max)
	}

	/// Moves to the observed status and stamps it.
	///
	/// Callers decide legality. Stamps never go below the latest existing stamp
	/// and an already set stamp is never overwritten.
	pub fn advance(&mut self, observation: &Observation, now: u64) {
		let at = now.max(self.last_stamp());
		let slot = match observation {
			Observation::Received => None,
			Observation::Pending => Some(&mut self.time_pending),
			Observation::Queued => Some(&mut self.time_queued),
			Observation::Mined(_) => Some(&mut self.time_mined),
			Observation::Dropped => Some(&mut self.time_dropped),
		};
		if let Some(slot) = slot {
			slot.get_or_insert(at);
		}

		if let Observation::Mined(info) = observation {
			self.block_number = Some(info.block_number);
			self.block_hash = Some(info.block_hash);
			self.gas_used = Some(info.gas_used);
			self.mine_status = info.status;
		}
		self.status = observation.status();
	}
}

/// A transaction together with one client's view of its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
	pub hash: TxHash,
	pub client: ClientId,
	pub tx: Transaction,
	pub metadata: TransactionMetadata,
}
