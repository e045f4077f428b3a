//! Cross-client comparison of a tracked transaction.
//!
//! Every field of the transaction body and of the lifecycle metadata is
//! compared by its serialized value. Local timestamps never count as common
//! since each client stamps them independently.

use crate::state::{StateError, StateTracker};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use txwatch_types::{
	ClientId, DivergentBlock, DivergentFields, FieldMap, StoredTransaction, TxBlock, TxDiff, TxHash,
	TIMESTAMP_FIELDS,
};

#[derive(Debug, Error)]
pub enum DiffError {
	#[error("Unknown transaction hash: {0}")]
	UnknownHash(TxHash),
	#[error("State error: {0}")]
	State(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
}

impl From<StateError> for DiffError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::UnknownHash(hash) => DiffError::UnknownHash(hash),
			other => DiffError::State(other.to_string()),
		}
	}
}

/// Read-only view over the state tracker producing [`TxDiff`]s.
pub struct DiffEngine {
	state: Arc<StateTracker>,
}

impl DiffEngine {
	pub fn new(state: Arc<StateTracker>) -> Self {
		Self { state }
	}

	pub async fn diff(&self, hash: &TxHash) -> Result<TxDiff, DiffError> {
		let records = self.state.get(hash).await?;
		compute_diff(*hash, &records)
	}
}

fn fields<T: Serialize>(value: &T) -> Result<FieldMap, DiffError> {
	match serde_json::to_value(value).map_err(|e| DiffError::Serialization(e.to_string()))? {
		serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
		other => Err(DiffError::Serialization(format!(
			"expected an object, got {}",
			other
		))),
	}
}

/// Splits per-client field maps into common and divergent parts.
fn split(
	per_client: &BTreeMap<&ClientId, FieldMap>,
	always_divergent: &[&str],
) -> (FieldMap, DivergentFields) {
	let names: BTreeSet<&String> = per_client.values().flat_map(|m| m.keys()).collect();
	let mut common = FieldMap::new();
	let mut divergent = DivergentFields::new();

	for name in names {
		let values: BTreeMap<ClientId, serde_json::Value> = per_client
			.iter()
			.filter_map(|(client, map)| map.get(name).map(|v| ((*client).clone(), v.clone())))
			.collect();

		let held_by_all = values.len() == per_client.len();
		let first = values.values().next();
		let agree = first.is_some_and(|first| values.values().all(|v| v == first));

		match first {
			Some(value) if held_by_all && agree && !always_divergent.contains(&name.as_str()) => {
				common.insert(name.clone(), value.clone());
			},
			_ => {
				divergent.insert(name.clone(), values);
			},
		}
	}

	(common, divergent)
}

/// Computes the diff of one hash from every client's record.
pub fn compute_diff(
	hash: TxHash,
	records: &BTreeMap<ClientId, StoredTransaction>,
) -> Result<TxDiff, DiffError> {
	if records.is_empty() {
		return Err(DiffError::UnknownHash(hash));
	}

	let mut txs = BTreeMap::new();
	let mut metadata = BTreeMap::new();
	for (client, record) in records {
		txs.insert(client, fields(&record.tx)?);
		metadata.insert(client, fields(&record.metadata)?);
	}

	let (common_tx, divergent_tx) = split(&txs, &[]);
	let (common_meta, divergent_meta) = split(&metadata, &TIMESTAMP_FIELDS);

	Ok(TxDiff {
		hash,
		clients: records.keys().cloned().collect(),
		common: TxBlock {
			tx: common_tx,
			metadata: common_meta,
		},
		divergent: DivergentBlock {
			tx: divergent_tx,
			metadata: divergent_meta,
		},
	})
}
