//! Read-only filtering and grouping over tracked transactions.

use crate::{ClientId, StoredTransaction, TxStatus, TxType};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive bounds. A missing side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T> {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min: Option<T>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max: Option<T>,
}

impl<T> Default for Range<T> {
	fn default() -> Self {
		Self {
			min: None,
			max: None,
		}
	}
}

impl<T: PartialOrd> Range<T> {
	pub fn contains(&self, value: &T) -> bool {
		self.min.as_ref().is_none_or(|min| value >= min)
			&& self.max.as_ref().is_none_or(|max| value <= max)
	}
}

/// Conditions a stored record must meet. Empty lists and open ranges match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
	pub clients: Vec<ClientId>,
	pub statuses: Vec<TxStatus>,
	pub types: Vec<TxType>,
	/// Bounds on [`FeeModel::fee_cap`](crate::FeeModel::fee_cap).
	pub fee_cap: Range<U256>,
	pub nonce: Range<u64>,
	/// Hex prefixes of the sender address, case-insensitive, `0x` optional.
	pub from: Vec<String>,
	/// Hex prefixes of the recipient address. Contract creations never match.
	pub to: Vec<String>,
}

impl FilterCriteria {
	pub fn matches(&self, record: &StoredTransaction) -> bool {
		(self.clients.is_empty() || self.clients.contains(&record.client))
			&& (self.statuses.is_empty() || self.statuses.contains(&record.metadata.status))
			&& (self.types.is_empty() || self.types.contains(&record.tx.tx_type()))
			&& self.fee_cap.contains(&record.tx.fee.fee_cap())
			&& self.nonce.contains(&record.tx.nonce)
			&& matches_address(&self.from, Some(&record.tx.from))
			&& matches_address(&self.to, record.tx.to.as_ref())
	}
}

fn strip_hex_prefix(s: &str) -> &str {
	s.strip_prefix("0x")
		.or_else(|| s.strip_prefix("0X"))
		.unwrap_or(s)
}

fn matches_address(patterns: &[String], address: Option<&Address>) -> bool {
	if patterns.is_empty() {
		return true;
	}
	let Some(address) = address else {
		return false;
	};
	let hex = format!("{:x}", address);
	let hex = strip_hex_prefix(&hex);
	patterns
		.iter()
		.any(|pattern| hex.starts_with(&strip_hex_prefix(pattern).to_ascii_lowercase()))
}

/// Attribute that records are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
	Client,
	Status,
	Type,
	Sender,
	Recipient,
}

impl GroupBy {
	fn key(&self, record: &StoredTransaction) -> String {
		match self {
			Self::Client => record.client.to_string(),
			Self::Status => record.metadata.status.to_string(),
			Self::Type => record.tx.tx_type().to_string(),
			Self::Sender => format!("{:#x}", record.tx.from),
			Self::Recipient => match &record.tx.to {
				Some(to) => format!("{:#x}", to),
				None => "contract_creation".to_string(),
			},
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedTransactions {
	pub groups: BTreeMap<String, Vec<StoredTransaction>>,
	pub total: usize,
	pub group_count: usize,
}

impl GroupedTransactions {
	/// Buckets `records` by `by`, keeping their order within each group.
	pub fn new(records: Vec<StoredTransaction>, by: GroupBy) -> Self {
		let total = records.len();
		let mut groups: BTreeMap<String, Vec<StoredTransaction>> = BTreeMap::new();
		for record in records {
			groups.entry(by.key(&record)).or_default().push(record);
		}
		Self {
			group_count: groups.len(),
			groups,
			total,
		}
	}
}
