//! Durable per-client transaction state.
//!
//! One [`StoredTransaction`] exists per (hash, client). Every write is a
//! read-modify-write of the whole record under a per-key lock, and the record
//! is persisted in a single storage write, so concurrent readers see either
//! the previous or the next version. Writers for different keys only contend
//! when they hash to the same lock stripe.

mod transition;

use crate::engine::event_bus::EventBus;
pub use transition::{decide, Decision};

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use txwatch_storage::StorageService;
use txwatch_types::{
	current_timestamp_millis, truncate_id, ClientId, FilterCriteria, MonitorEvent, Observation, StateEvent,
	StorageKey, StoredTransaction, Transaction, TransactionMetadata, TxHash, TxStatus,
};

const LOCK_STRIPES: usize = 64;

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Transition rejected: {from} -> {to}")]
	TransitionRejected { from: TxStatus, to: TxStatus },
	#[error("Unknown transaction hash: {0}")]
	UnknownHash(TxHash),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	Created(TxStatus),
	Transitioned { from: TxStatus, to: TxStatus },
	/// The observation was not a forward move.
	Unchanged(TxStatus),
}

pub struct StateTracker {
	storage: Arc<StorageService>,
	event_bus: EventBus,
	locks: Vec<Mutex<()>>,
}

fn record_id(hash: &TxHash, client: &ClientId) -> String {
	format!("{}:{}", hash, client)
}

impl StateTracker {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self {
			storage,
			event_bus,
			locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
		}
	}

	fn stripe(&self, hash: &TxHash, client: &ClientId) -> &Mutex<()> {
		let mut hasher = DefaultHasher::new();
		hash.hash(&mut hasher);
		client.hash(&mut hasher);
		&self.locks[(hasher.finish() as usize) % self.locks.len()]
	}

	fn publish(&self, event: StateEvent) {
		self.event_bus.publish(MonitorEvent::State(event)).ok();
	}

	/// Records an observation made now. See [`upsert_at`](Self::upsert_at).
	pub async fn upsert(
		&self,
		client: &ClientId,
		hash: TxHash,
		tx: &Transaction,
		observation: Observation,
	) -> Result<UpsertOutcome, StateError> {
		self.upsert_at(client, hash, tx, observation, current_timestamp_millis())
			.await
	}

	/// Records that `client` reported `hash` with the given status at `observed_at`.
	///
	/// The first observation creates the record and keeps its transaction
	/// body; later bodies are ignored. Later observations move the record
	/// forward, are ignored when they are not forward moves, and fail with
	/// [`StateError::TransitionRejected`] when they would leave a terminal state.
	pub async fn upsert_at(
		&self,
		client: &ClientId,
		hash: TxHash,
		tx: &Transaction,
		observation: Observation,
		observed_at: u64,
	) -> Result<UpsertOutcome, StateError> {
		let _guard = self.stripe(&hash, client).lock().await;

		match self.load(&hash, client).await? {
			Some(record) => self.apply(record, observation, observed_at).await,
			None => {
				let status = observation.status();
				let record = StoredTransaction {
					hash,
					client: client.clone(),
					tx: tx.clone(),
					metadata: TransactionMetadata::observed(&observation, observed_at),
				};
				self.save(&record).await?;
				tracing::debug!(
					client = %client,
					tx_hash = %truncate_id(&hash.to_string()),
					status = %status,
					"Tracking transaction"
				);
				self.publish(StateEvent::Created {
					client: client.clone(),
					hash,
					status,
				});
				Ok(UpsertOutcome::Created(status))
			},
		}
	}

	/// Applies an externally inferred verdict (mined or dropped) to an existing record.
	pub async fn advance(
		&self,
		client: &ClientId,
		hash: TxHash,
		observation: Observation,
	) -> Result<UpsertOutcome, StateError> {
		let _guard = self.stripe(&hash, client).lock().await;

		let record = self
			.load(&hash, client)
			.await?
			.ok_or(StateError::UnknownHash(hash))?;
		self.apply(record, observation, current_timestamp_millis())
			.await
	}

	async fn apply(
		&self,
		mut record: StoredTransaction,
		observation: Observation,
		now: u64,
	) -> Result<UpsertOutcome, StateError> {
		let from = record.metadata.status;
		let to = observation.status();

		match decide(from, to) {
			Decision::Ignore => Ok(UpsertOutcome::Unchanged(from)),
			Decision::Reject => {
				self.publish(StateEvent::Rejected {
					client: record.client,
					hash: record.hash,
					from,
					to,
				});
				Err(StateError::TransitionRejected { from, to })
			},
			Decision::Apply => {
				record.metadata.advance(&observation, now);
				self.save(&record).await?;
				tracing::debug!(
					client = %record.client,
					tx_hash = %truncate_id(&record.hash.to_string()),
					from = %from,
					to = %to,
					"Status changed"
				);
				self.publish(StateEvent::Transitioned {
					client: record.client,
					hash: record.hash,
					from,
					to,
				});
				Ok(UpsertOutcome::Transitioned { from, to })
			},
		}
	}

	/// Every client's record for `hash`. Empty when no client holds it.
	pub async fn get(
		&self,
		hash: &TxHash,
	) -> Result<BTreeMap<ClientId, StoredTransaction>, StateError> {
		let records: Vec<StoredTransaction> = self
			.storage
			.list(StorageKey::Transactions.as_str(), &format!("{}:", hash))
			.await
			.map_err(|e| StateError::Storage(e.to_string()))?;
		Ok(records
			.into_iter()
			.map(|record| (record.client.clone(), record))
			.collect())
	}

	/// One client's record for `hash`.
	pub async fn get_for_client(
		&self,
		hash: &TxHash,
		client: &ClientId,
	) -> Result<Option<StoredTransaction>, StateError> {
		self.load(hash, client).await
	}

	/// Whether any client holds `hash`.
	pub async fn is_known(&self, hash: &TxHash) -> Result<bool, StateError> {
		self.storage
			.count(StorageKey::Transactions.as_str(), &format!("{}:", hash))
			.await
			.map(|n| n > 0)
			.map_err(|e| StateError::Storage(e.to_string()))
	}

	/// Every record matching `criteria`, ordered by hash and then client.
	pub async fn query(
		&self,
		criteria: &FilterCriteria,
	) -> Result<Vec<StoredTransaction>, StateError> {
		let records: Vec<StoredTransaction> = self
			.storage
			.list(StorageKey::Transactions.as_str(), "")
			.await
			.map_err(|e| StateError::Storage(e.to_string()))?;
		Ok(records
			.into_iter()
			.filter(|record| criteria.matches(record))
			.collect())
	}

	async fn load(
		&self,
		hash: &TxHash,
		client: &ClientId,
	) -> Result<Option<StoredTransaction>, StateError> {
		self.storage
			.try_retrieve(StorageKey::Transactions.as_str(), &record_id(hash, client))
			.await
			.map_err(|e| StateError::Storage(e.to_string()))
	}

	async fn save(&self, record: &StoredTransaction) -> Result<(), StateError> {
		self.storage
			.store(
				StorageKey::Transactions.as_str(),
				&record_id(&record.hash, &record.client),
				record,
			)
			.await
			.map_err(|e| StateError::Storage(e.to_string()))
	}
}
