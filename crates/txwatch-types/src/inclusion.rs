//! Inclusion-list announcements and reports.

use crate::TxHash;
use serde::{Deserialize, Serialize};

/// A validator's claim of which transactions it includes for a slot.
///
/// Signature checking happens upstream; the reconciler trusts this input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionAnnouncement {
	pub slot: Option<u64>,
	pub transactions: Vec<TxHash>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validator_index: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionSummary {
	pub total: usize,
	pub included: usize,
	pub missing: usize,
}

/// Point-in-time reconciliation of one announcement. Never revised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionReport {
	pub slot: u64,
	/// Position among the reports of the same slot, starting at 0.
	pub sequence: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validator_index: Option<u64>,
	pub included: Vec<TxHash>,
	pub missing: Vec<TxHash>,
	pub summary: InclusionSummary,
	/// Unix millis at which the report was finalized.
	pub generated_at: u64,
}
