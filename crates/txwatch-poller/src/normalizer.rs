//! Conversion of node-native pool records into canonical transactions.
//!
//! Nodes report transactions as JSON objects with hex quantities. The
//! normalizer parses one record at a time and picks exactly one fee model from
//! the type tag, so a bad record can be skipped without affecting the rest of
//! the batch. It performs no I/O; the observation time is passed in.

use alloy_primitives::{Address, Bytes, U256};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use txwatch_types::{
	FeeModel, Observation, PoolBucket, PoolRecord, Transaction, TransactionMetadata, TxHash,
	TxType,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("Malformed record: field '{field}': {reason}")]
	MalformedRecord { field: &'static str, reason: String },
}

fn malformed(field: &'static str, reason: impl Into<String>) -> NormalizeError {
	NormalizeError::MalformedRecord {
		field,
		reason: reason.into(),
	}
}

/// Records a type tag the normalizer did not recognise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
	pub reported_type: String,
	pub classified_as: TxType,
}

/// A parsed record ready to be handed to the state tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTransaction {
	pub hash: TxHash,
	pub bucket: PoolBucket,
	pub tx: Transaction,
	/// Initial metadata implied by the bucket, stamped at observation time.
	pub metadata: TransactionMetadata,
	/// Set when the type tag was unknown and a fallback was applied.
	pub classification: Option<Classification>,
}

impl NormalizedTransaction {
	pub fn observation(&self) -> Observation {
		self.bucket.into()
	}
}

/// Stateless record parser for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
	/// Used when a record carries no `chainId` (pre-EIP-155 legacy transactions).
	default_chain_id: Option<u64>,
}

impl Normalizer {
	pub fn new(default_chain_id: Option<u64>) -> Self {
		Self { default_chain_id }
	}

	/// Normalizes one record observed at `now` (unix millis).
	pub fn normalize(
		&self,
		record: &PoolRecord<'_>,
		now: u64,
	) -> Result<NormalizedTransaction, NormalizeError> {
		let raw = record
			.raw
			.as_object()
			.ok_or_else(|| malformed("record", "expected a JSON object"))?;
		let field = |name: &str| raw.get(name).filter(|v| !v.is_null());

		let hash = match field("hash") {
			Some(v) => parse_str(v, "hash")?
				.parse::<TxHash>()
				.map_err(|e| malformed("hash", e.to_string()))?,
			None => return Err(malformed("hash", "missing")),
		};

		let from = match field("from") {
			Some(v) => parse_address(v, "from")?,
			None => record
				.address
				.parse::<Address>()
				.map_err(|e| malformed("from", format!("bucket address: {}", e)))?,
		};

		let nonce = match field("nonce") {
			Some(v) => parse_u64(v, "nonce")?,
			None => record
				.nonce
				.parse::<u64>()
				.map_err(|e| malformed("nonce", format!("bucket nonce: {}", e)))?,
		};
		if let Ok(keyed) = record.nonce.parse::<u64>() {
			if keyed != nonce {
				tracing::warn!(
					tx_hash = %hash,
					record_nonce = nonce,
					bucket_nonce = keyed,
					"Record nonce disagrees with its bucket key; keeping the record's"
				);
			}
		}

		let gas = field("gas")
			.ok_or_else(|| malformed("gas", "missing"))
			.and_then(|v| parse_u64(v, "gas"))?;
		let value = field("value")
			.ok_or_else(|| malformed("value", "missing"))
			.and_then(|v| parse_u256(v, "value"))?;

		let to = field("to").map(|v| parse_address(v, "to")).transpose()?;
		let input = field("input")
			.or_else(|| field("data"))
			.map(|v| {
				parse_str(v, "input")?
					.parse::<Bytes>()
					.map_err(|e| malformed("input", e.to_string()))
			})
			.transpose()?
			.unwrap_or_default();
		let chain_id = field("chainId")
			.map(|v| parse_u64(v, "chainId"))
			.transpose()?
			.or(self.default_chain_id);

		let (fee, classification) = select_fee_model(&field)?;

		let tx = Transaction {
			chain_id,
			from,
			to,
			is_contract_creation: to.is_none(),
			nonce,
			value,
			gas,
			fee,
			input,
		};
		let metadata = TransactionMetadata::observed(&record.bucket.into(), now);

		Ok(NormalizedTransaction {
			hash,
			bucket: record.bucket,
			tx,
			metadata,
			classification,
		})
	}
}

/// Chooses the fee model from the `type` tag and reads the fields it implies.
fn select_fee_model<'a>(
	field: &dyn Fn(&str) -> Option<&'a Value>,
) -> Result<(FeeModel, Option<Classification>), NormalizeError> {
	let required = |name: &'static str| -> Result<U256, NormalizeError> {
		field(name)
			.ok_or_else(|| malformed(name, "missing for transaction type"))
			.and_then(|v| parse_u256(v, name))
	};

	let reported = match field("type") {
		None => None,
		Some(v) => Some(parse_str(v, "type")?.to_string()),
	};
	let tx_type = match &reported {
		None => Some(TxType::Legacy),
		Some(tag) => hex_quantity(tag)
			.ok()
			.and_then(|tag| u64::try_from(tag).ok())
			.and_then(TxType::from_tag),
	};

	let fee = match tx_type {
		Some(TxType::Legacy) => FeeModel::Legacy {
			gas_price: required("gasPrice")?,
		},
		Some(TxType::AccessList) => FeeModel::AccessList {
			gas_price: required("gasPrice")?,
		},
		Some(TxType::DynamicFee) => FeeModel::DynamicFee {
			max_fee_per_gas: required("maxFeePerGas")?,
			max_priority_fee_per_gas: required("maxPriorityFeePerGas")?,
		},
		Some(TxType::Blob) => FeeModel::Blob {
			max_fee_per_gas: required("maxFeePerGas")?,
			max_priority_fee_per_gas: required("maxPriorityFeePerGas")?,
			max_fee_per_blob_gas: required("maxFeePerBlobGas")?,
		},
		Some(TxType::SetCode) => FeeModel::SetCode {
			max_fee_per_gas: required("maxFeePerGas")?,
			max_priority_fee_per_gas: required("maxPriorityFeePerGas")?,
		},
		None => {
			// Unknown tag: fall back to legacy pricing, preferring gasPrice.
			let gas_price = match field("gasPrice") {
				Some(v) => parse_u256(v, "gasPrice")?,
				None => required("maxFeePerGas")?,
			};
			let classification = Classification {
				reported_type: reported.unwrap_or_default(),
				classified_as: TxType::Legacy,
			};
			return Ok((FeeModel::Legacy { gas_price }, Some(classification)));
		},
	};

	Ok((fee, None))
}

fn parse_str<'v>(value: &'v Value, field: &'static str) -> Result<&'v str, NormalizeError> {
	value
		.as_str()
		.ok_or_else(|| malformed(field, format!("expected string, got {}", value)))
}

fn parse_address(value: &Value, field: &'static str) -> Result<Address, NormalizeError> {
	parse_str(value, field)?
		.parse::<Address>()
		.map_err(|e| malformed(field, e.to_string()))
}

/// Parses a JSON-RPC quantity: lowercase `0x` followed by at least one hex digit.
fn hex_quantity(s: &str) -> Result<U256, String> {
	match s.strip_prefix("0x") {
		Some(digits) if !digits.is_empty() => {
			U256::from_str(s).map_err(|e| format!("'{}': {}", s, e))
		},
		_ => Err(format!("'{}' is not a hex quantity", s)),
	}
}

fn parse_u256(value: &Value, field: &'static str) -> Result<U256, NormalizeError> {
	hex_quantity(parse_str(value, field)?).map_err(|reason| malformed(field, reason))
}

fn parse_u64(value: &Value, field: &'static str) -> Result<u64, NormalizeError> {
	let quantity = parse_u256(value, field)?;
	u64::try_from(quantity).map_err(|_| malformed(field, format!("{} exceeds 64 bits", quantity)))
}
