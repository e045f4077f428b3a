//! Storage namespaces used by the monitor.

use std::str::FromStr;

/// Storage keys for the different data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Stored transactions, keyed by `<hash>:<client>`.
	Transactions,
	/// Inclusion reports, keyed by `<slot>:<sequence>`.
	InclusionReports,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Transactions => "txs",
			StorageKey::InclusionReports => "inclusion_reports",
		}
	}

	/// Whether entries in this namespace may be given a time-to-live.
	/// Inclusion reports are append-only.
	pub fn allows_ttl(&self) -> bool {
		!matches!(self, StorageKey::InclusionReports)
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Transactions, Self::InclusionReports].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"txs" => Ok(Self::Transactions),
			"inclusion_reports" => Ok(Self::InclusionReports),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
