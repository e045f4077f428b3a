//! Node-native pool content.
//!
//! Records are kept as raw JSON so that a single malformed entry can be
//! rejected by the normalizer without failing the whole response.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Pool bucket a node reported a transaction in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolBucket {
	/// Nonce-ready transactions.
	Pending,
	/// Nonce-gapped transactions.
	Queued,
}

impl PoolBucket {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Queued => "queued",
		}
	}
}

impl fmt::Display for PoolBucket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PoolBucket {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"queued" => Ok(Self::Queued),
			other => Err(format!("unknown pool bucket '{}'", other)),
		}
	}
}

/// address -> nonce -> node transaction.
pub type NodeBucket = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Result of a `txpool_content` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolContent {
	#[serde(default)]
	pub pending: NodeBucket,
	#[serde(default)]
	pub queued: NodeBucket,
}

/// One node transaction together with the keys it was indexed under.
#[derive(Debug, Clone, Copy)]
pub struct PoolRecord<'a> {
	pub bucket: PoolBucket,
	pub address: &'a str,
	pub nonce: &'a str,
	pub raw: &'a serde_json::Value,
}

impl PoolContent {
	/// Number of records in the given bucket.
	pub fn count(&self, bucket: PoolBucket) -> usize {
		let map = match bucket {
			PoolBucket::Pending => &self.pending,
			PoolBucket::Queued => &self.queued,
		};
		map.values().map(BTreeMap::len).sum()
	}

	/// Iterates every record, pending bucket first.
	pub fn records(&self) -> impl Iterator<Item = PoolRecord<'_>> {
		bucket_records(PoolBucket::Pending, &self.pending)
			.chain(bucket_records(PoolBucket::Queued, &self.queued))
	}
}

fn bucket_records(bucket: PoolBucket, map: &NodeBucket) -> impl Iterator<Item = PoolRecord<'_>> {
	map.iter().flat_map(move |(address, by_nonce)| {
		by_nonce.iter().map(move |(nonce, raw)| PoolRecord {
			bucket,
			address: address.as_str(),
			nonce: nonce.as_str(),
			raw,
		})
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_records_cover_both_buckets() {
		let content: PoolContent = serde_json::from_value(json!({
			"pending": { "0xaa": { "1": {}, "2": {} } },
			"queued": { "0xbb": { "9": {} } }
		}))
		.unwrap();

		assert_eq!(content.count(PoolBucket::Pending), 2);
		assert_eq!(content.count(PoolBucket::Queued), 1);

		let records: Vec<_> = content.records().collect();
		assert_eq!(records.len(), 3);
		assert_eq!(records[2].bucket, PoolBucket::Queued);
		assert_eq!(records[2].address, "0xbb");
		assert_eq!(records[2].nonce, "9");
	}

	#[test]
	fn test_missing_bucket_defaults_to_empty() {
		let content: PoolContent = serde_json::from_value(json!({ "pending": {} })).unwrap();
		assert_eq!(content.records().count(), 0);
	}
}
