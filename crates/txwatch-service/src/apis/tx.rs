//! Transaction queries: the cross-client diff, the raw per-client records and
//! filtered or grouped listings.

use super::ApiError;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use txwatch_core::{DiffError, MonitorEngine, StateError};
use txwatch_types::{
	parse_tx_hash, ClientId, FilterCriteria, GroupBy, GroupedTransactions, Range,
	StoredTransaction, TxDiff, TxHash, TxStatus, TxType,
};

/// Query string of `GET /tx`. Every parameter is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TxQueryParams {
	pub client: Option<String>,
	pub status: Option<TxStatus>,
	#[serde(rename = "type")]
	pub tx_type: Option<TxType>,
	pub from: Option<String>,
	pub to: Option<String>,
	pub min_nonce: Option<u64>,
	pub max_nonce: Option<u64>,
	/// Decimal or `0x` hex.
	pub min_fee_cap: Option<String>,
	pub max_fee_cap: Option<String>,
	pub group_by: Option<GroupBy>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TxQueryResponse {
	List(Vec<StoredTransaction>),
	Grouped(GroupedTransactions),
}

fn parse_fee(name: &str, raw: Option<&str>) -> Result<Option<U256>, ApiError> {
	raw.map(|raw| {
		U256::from_str(raw)
			.map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", name, e)))
	})
	.transpose()
}

impl TxQueryParams {
	fn criteria(&self) -> Result<FilterCriteria, ApiError> {
		Ok(FilterCriteria {
			clients: self.client.iter().map(|c| ClientId::new(c.as_str())).collect(),
			statuses: self.status.into_iter().collect(),
			types: self.tx_type.into_iter().collect(),
			fee_cap: Range {
				min: parse_fee("min_fee_cap", self.min_fee_cap.as_deref())?,
				max: parse_fee("max_fee_cap", self.max_fee_cap.as_deref())?,
			},
			nonce: Range {
				min: self.min_nonce,
				max: self.max_nonce,
			},
			from: self.from.iter().cloned().collect(),
			to: self.to.iter().cloned().collect(),
		})
	}
}

fn parse_hash(raw: &str) -> Result<TxHash, ApiError> {
	parse_tx_hash(raw).map_err(ApiError::BadRequest)
}

/// GET /tx/{hash}
pub async fn get_tx_diff(hash: &str, engine: &MonitorEngine) -> Result<TxDiff, ApiError> {
	let hash = parse_hash(hash)?;
	engine.diff().diff(&hash).await.map_err(|e| match e {
		DiffError::UnknownHash(_) => ApiError::NotFound(e.to_string()),
		other => ApiError::Internal(other.to_string()),
	})
}

/// GET /tx/{hash}/clients
pub async fn get_tx_clients(
	hash: &str,
	engine: &MonitorEngine,
) -> Result<BTreeMap<ClientId, StoredTransaction>, ApiError> {
	let hash = parse_hash(hash)?;
	let records = engine
		.state()
		.get(&hash)
		.await
		.map_err(|e: StateError| ApiError::Internal(e.to_string()))?;
	if records.is_empty() {
		return Err(ApiError::NotFound(
			StateError::UnknownHash(hash).to_string(),
		));
	}
	Ok(records)
}

/// GET /tx/{hash}/clients/{client}
pub async fn get_tx_client(
	hash: &str,
	client: &str,
	engine: &MonitorEngine,
) -> Result<StoredTransaction, ApiError> {
	let hash = parse_hash(hash)?;
	engine
		.state()
		.get_for_client(&hash, &ClientId::from(client))
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))?
		.ok_or_else(|| {
			ApiError::NotFound(format!("Client '{}' has not seen transaction {}", client, hash))
		})
}

/// GET /tx
pub async fn query_txs(
	params: &TxQueryParams,
	engine: &MonitorEngine,
) -> Result<TxQueryResponse, ApiError> {
	let criteria = params.criteria()?;
	let records = engine
		.state()
		.query(&criteria)
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))?;
	Ok(match params.group_by {
		Some(by) => TxQueryResponse::Grouped(GroupedTransactions::new(records, by)),
		None => TxQueryResponse::List(records),
	})
}
