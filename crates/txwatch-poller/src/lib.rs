//! Pool polling module for the txpool-watch system.
//!
//! A [`PoolSource`] answers two questions about one node endpoint: what is in
//! its transaction pool right now, and whether a given hash has a receipt.
//! [`PollerService`] wraps a source with the endpoint's client id, a bounded
//! timeout and a [`Normalizer`], and turns one pool query into a snapshot of
//! canonical transactions plus the records it had to skip.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use txwatch_types::{
	current_timestamp_millis, truncate_id, ClientId, ConfigSchema, ImplementationRegistry,
	MinedInfo, PoolBucket, PoolContent, TxHash,
};

pub mod normalizer;

pub use normalizer::{Classification, NormalizeError, NormalizedTransaction, Normalizer};

pub mod implementations {
	pub mod rpc;
}

#[derive(Debug, Error)]
pub enum PollError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Request timed out after {0:?}")]
	Timeout(Duration),
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Interface to one node endpoint's transaction pool.
#[async_trait]
pub trait PoolSource: Send + Sync {
	/// Issues a single pool-content query.
	async fn fetch_pool(&self) -> Result<PoolContent, PollError>;

	/// Looks up the receipt of `hash`. `None` when the node knows no receipt.
	async fn receipt(&self, hash: TxHash) -> Result<Option<MinedInfo>, PollError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type PoolSourceFactory = fn(&toml::Value) -> Result<Box<dyn PoolSource>, PollError>;

pub trait PoolSourceRegistry: ImplementationRegistry<Factory = PoolSourceFactory> {}

/// Get all registered pool source implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, PoolSourceFactory)> {
	use implementations::rpc;

	vec![(rpc::Registry::NAME, rpc::Registry::factory())]
}

/// A record the normalizer rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
	pub bucket: PoolBucket,
	pub address: String,
	pub nonce: String,
	pub error: NormalizeError,
}

/// Outcome of one successful poll.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
	pub pending: usize,
	pub queued: usize,
	pub transactions: Vec<NormalizedTransaction>,
	pub skipped: Vec<SkippedRecord>,
}

impl PollSnapshot {
	pub fn hashes(&self) -> impl Iterator<Item = TxHash> + '_ {
		self.transactions.iter().map(|t| t.hash)
	}
}

/// One endpoint: its client id, source and timeout.
pub struct PollerService {
	client: ClientId,
	source: Box<dyn PoolSource>,
	normalizer: Normalizer,
	timeout: Duration,
}

impl PollerService {
	pub fn new(
		client: ClientId,
		source: Box<dyn PoolSource>,
		normalizer: Normalizer,
		timeout: Duration,
	) -> Self {
		Self {
			client,
			source,
			normalizer,
			timeout,
		}
	}

	pub fn client(&self) -> &ClientId {
		&self.client
	}

	/// Fetches the pool once and normalizes every record.
	///
	/// The whole fetch, including decoding, is bounded by the configured
	/// timeout. Records that fail to normalize are returned in
	/// [`PollSnapshot::skipped`]; they never fail the poll.
	#[instrument(skip_all, fields(client = %self.client))]
	pub async fn poll(&self) -> Result<PollSnapshot, PollError> {
		let content = tokio::time::timeout(self.timeout, self.source.fetch_pool())
			.await
			.map_err(|_| PollError::Timeout(self.timeout))??;
		let now = current_timestamp_millis();

		let mut snapshot = PollSnapshot {
			pending: content.count(PoolBucket::Pending),
			queued: content.count(PoolBucket::Queued),
			..Default::default()
		};

		for record in content.records() {
			match self.normalizer.normalize(&record, now) {
				Ok(normalized) => snapshot.transactions.push(normalized),
				Err(error) => {
					tracing::warn!(
						bucket = %record.bucket,
						address = %record.address,
						nonce = %record.nonce,
						error = %error,
						"Skipping malformed pool record"
					);
					snapshot.skipped.push(SkippedRecord {
						bucket: record.bucket,
						address: record.address.to_string(),
						nonce: record.nonce.to_string(),
						error,
					});
				},
			}
		}

		tracing::debug!(
			pending = snapshot.pending,
			queued = snapshot.queued,
			skipped = snapshot.skipped.len(),
			"Pool fetched"
		);
		Ok(snapshot)
	}

	/// Looks up a receipt under the same timeout as a pool fetch.
	pub async fn receipt(&self, hash: TxHash) -> Result<Option<MinedInfo>, PollError> {
		let receipt = tokio::time::timeout(self.timeout, self.source.receipt(hash))
			.await
			.map_err(|_| PollError::Timeout(self.timeout))??;
		tracing::trace!(
			client = %self.client,
			tx_hash = %truncate_id(&hash.to_string()),
			found = receipt.is_some(),
			"Receipt lookup"
		);
		Ok(receipt)
	}
}

#[cfg(test)]
pub(crate) mod testing {
	use super::*;
	use serde_json::{json, Value};
	use std::collections::BTreeMap;
	use std::sync::Mutex;
	use txwatch_types::{NodeBucket, Schema, ValidationError};

	pub const SENDER: &str = "0x1111111111111111111111111111111111111111";

	/// Dynamic-fee node record with the given hash byte and nonce.
	pub fn node_tx(hash: u64, nonce: u64) -> Value {
		json!({
			"hash": format!("{:#066x}", hash),
			"from": SENDER,
			"to": "0x2222222222222222222222222222222222222222",
			"nonce": format!("{:#x}", nonce),
			"gas": "0x5208",
			"value": "0x1",
			"input": "0x",
			"type": "0x2",
			"maxFeePerGas": "0xa",
			"maxPriorityFeePerGas": "0x1"
		})
	}

	pub fn bucket(records: impl IntoIterator<Item = (u64, Value)>) -> NodeBucket {
		let by_nonce: BTreeMap<String, Value> = records
			.into_iter()
			.map(|(nonce, raw)| (nonce.to_string(), raw))
			.collect();
		BTreeMap::from([(SENDER.to_string(), by_nonce)])
	}

	struct EmptySchema;

	impl ConfigSchema for EmptySchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Scripted pool source. Each fetch pops the next response; once the
	/// script is exhausted the last response repeats.
	pub struct FakeSource {
		pub responses: Mutex<Vec<Result<PoolContent, String>>>,
		pub receipts: Mutex<BTreeMap<TxHash, MinedInfo>>,
		pub delay: Duration,
	}

	impl FakeSource {
		pub fn new(responses: Vec<Result<PoolContent, String>>) -> Self {
			Self {
				responses: Mutex::new(responses),
				receipts: Mutex::new(BTreeMap::new()),
				delay: Duration::ZERO,
			}
		}
	}

	#[async_trait]
	impl PoolSource for FakeSource {
		async fn fetch_pool(&self) -> Result<PoolContent, PollError> {
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}
			let mut responses = self.responses.lock().unwrap();
			let next = if responses.len() > 1 {
				responses.remove(0)
			} else {
				responses
					.first()
					.cloned()
					.unwrap_or_else(|| Ok(PoolContent::default()))
			};
			next.map_err(PollError::Network)
		}

		async fn receipt(&self, hash: TxHash) -> Result<Option<MinedInfo>, PollError> {
			Ok(self.receipts.lock().unwrap().get(&hash).cloned())
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(EmptySchema)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::testing::*;
	use super::*;

	fn service(source: FakeSource, timeout: Duration) -> PollerService {
		PollerService::new(
			ClientId::from("geth"),
			Box::new(source),
			Normalizer::default(),
			timeout,
		)
	}

	#[tokio::test]
	async fn test_one_malformed_among_many() {
		let mut records: Vec<(u64, serde_json::Value)> =
			(0..100).map(|n| (n, node_tx(n + 1, n))).collect();
		let mut broken = node_tx(999, 100);
		broken["gas"] = serde_json::json!("not-hex");
		records.push((100, broken));

		let content = PoolContent {
			pending: bucket(records),
			queued: Default::default(),
		};
		let poller = service(FakeSource::new(vec![Ok(content)]), Duration::from_secs(1));

		let snapshot = poller.poll().await.unwrap();
		assert_eq!(snapshot.pending, 101);
		assert_eq!(snapshot.transactions.len(), 100);
		assert_eq!(snapshot.skipped.len(), 1);
		assert_eq!(snapshot.skipped[0].nonce, "100");
	}

	#[tokio::test(start_paused = true)]
	async fn test_fetch_is_bounded_by_timeout() {
		let mut source = FakeSource::new(vec![Ok(PoolContent::default())]);
		source.delay = Duration::from_secs(10);
		let poller = service(source, Duration::from_millis(500));

		let err = poller.poll().await.unwrap_err();
		assert!(matches!(err, PollError::Timeout(d) if d == Duration::from_millis(500)));
	}

	#[tokio::test]
	async fn test_source_failure_surfaces() {
		let poller = service(
			FakeSource::new(vec![Err("connection refused".to_string())]),
			Duration::from_secs(1),
		);
		assert!(matches!(poller.poll().await, Err(PollError::Network(_))));
	}
}
