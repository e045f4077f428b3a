//! Canonical transaction record.
//!
//! A [`Transaction`] is built once by the normalizer and never mutated. The fee
//! fields are carried by [`FeeModel`], whose variant doubles as the transaction
//! type tag, so a record can only hold the fee fields its type allows.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction hash as reported by the nodes.
pub type TxHash = B256;

/// Identifier of the endpoint (client) that observed a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ClientId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for ClientId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// Transaction type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
	Legacy,
	AccessList,
	DynamicFee,
	Blob,
	SetCode,
}

impl TxType {
	/// Maps an EIP-2718 type byte to a known type. Unknown bytes return `None`.
	pub fn from_tag(tag: u64) -> Option<Self> {
		match tag {
			0 => Some(Self::Legacy),
			1 => Some(Self::AccessList),
			2 => Some(Self::DynamicFee),
			3 => Some(Self::Blob),
			4 => Some(Self::SetCode),
			_ => None,
		}
	}

	/// Returns the EIP-2718 type byte.
	pub fn tag(&self) -> u8 {
		match self {
			Self::Legacy => 0,
			Self::AccessList => 1,
			Self::DynamicFee => 2,
			Self::Blob => 3,
			Self::SetCode => 4,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Legacy => "legacy",
			Self::AccessList => "access_list",
			Self::DynamicFee => "dynamic_fee",
			Self::Blob => "blob",
			Self::SetCode => "set_code",
		}
	}
}

impl fmt::Display for TxType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Fee fields of a transaction, tagged with the transaction type.
///
/// Serialized flat into the parent record with a `type` discriminator, so the
/// JSON form only ever contains the fee keys that apply to the type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeModel {
	Legacy {
		gas_price: U256,
	},
	AccessList {
		gas_price: U256,
	},
	DynamicFee {
		max_fee_per_gas: U256,
		max_priority_fee_per_gas: U256,
	},
	Blob {
		max_fee_per_gas: U256,
		max_priority_fee_per_gas: U256,
		max_fee_per_blob_gas: U256,
	},
	SetCode {
		max_fee_per_gas: U256,
		max_priority_fee_per_gas: U256,
	},
}

impl FeeModel {
	pub fn tx_type(&self) -> TxType {
		match self {
			Self::Legacy { .. } => TxType::Legacy,
			Self::AccessList { .. } => TxType::AccessList,
			Self::DynamicFee { .. } => TxType::DynamicFee,
			Self::Blob { .. } => TxType::Blob,
			Self::SetCode { .. } => TxType::SetCode,
		}
	}

	/// Flat gas price, only for the types that carry one.
	pub fn gas_price(&self) -> Option<U256> {
		match self {
			Self::Legacy { gas_price } | Self::AccessList { gas_price } => Some(*gas_price),
			_ => None,
		}
	}

	pub fn max_fee_per_gas(&self) -> Option<U256> {
		match self {
			Self::DynamicFee { max_fee_per_gas, .. }
			| Self::Blob { max_fee_per_gas, .. }
			| Self::SetCode { max_fee_per_gas, .. } => Some(*max_fee_per_gas),
			_ => None,
		}
	}

	/// Highest price per gas the sender accepts: the flat gas price, or the
	/// max fee for types with a priority fee.
	pub fn fee_cap(&self) -> U256 {
		match self {
			Self::Legacy { gas_price } | Self::AccessList { gas_price } => *gas_price,
			Self::DynamicFee { max_fee_per_gas, .. }
			| Self::Blob { max_fee_per_gas, .. }
			| Self::SetCode { max_fee_per_gas, .. } => *max_fee_per_gas,
		}
	}

	pub fn max_fee_per_blob_gas(&self) -> Option<U256> {
		match self {
			Self::Blob {
				max_fee_per_blob_gas,
				..
			} => Some(*max_fee_per_blob_gas),
			_ => None,
		}
	}
}

/// Canonical, client-agnostic transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Absent for pre-EIP-155 legacy transactions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_id: Option<u64>,
	pub from: Address,
	/// `None` marks a contract creation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<Address>,
	pub is_contract_creation: bool,
	pub nonce: u64,
	pub value: U256,
	pub gas: u64,
	#[serde(flatten)]
	pub fee: FeeModel,
	pub input: Bytes,
}

impl Transaction {
	pub fn tx_type(&self) -> TxType {
		self.fee.tx_type()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	fn sample(fee: FeeModel, to: Option<Address>) -> Transaction {
		Transaction {
			chain_id: Some(1),
			from: address!("1111111111111111111111111111111111111111"),
			to,
			is_contract_creation: to.is_none(),
			nonce: 7,
			value: U256::from(1u64),
			gas: 21_000,
			fee,
			input: Bytes::new(),
		}
	}

	#[test]
	fn test_fee_fields_follow_type() {
		let tx = sample(
			FeeModel::DynamicFee {
				max_fee_per_gas: U256::from(30u64),
				max_priority_fee_per_gas: U256::from(2u64),
			},
			Some(address!("2222222222222222222222222222222222222222")),
		);
		let json = serde_json::to_value(&tx).unwrap();
		assert_eq!(json["type"], "dynamic_fee");
		assert!(json.get("max_fee_per_gas").is_some());
		assert!(json.get("gas_price").is_none());
		assert!(json.get("max_fee_per_blob_gas").is_none());

		let back: Transaction = serde_json::from_value(json).unwrap();
		assert_eq!(back, tx);
	}

	#[test]
	fn test_contract_creation_has_no_recipient_key() {
		let tx = sample(
			FeeModel::Legacy {
				gas_price: U256::from(10u64),
			},
			None,
		);
		let json = serde_json::to_value(&tx).unwrap();
		assert!(json.get("to").is_none());
		assert_eq!(json["is_contract_creation"], true);
		assert_eq!(tx.tx_type(), TxType::Legacy);
		assert_eq!(tx.fee.gas_price(), Some(U256::from(10u64)));
	}

	#[test]
	fn test_type_tags() {
		for tag in 0..=4u64 {
			let ty = TxType::from_tag(tag).unwrap();
			assert_eq!(ty.tag() as u64, tag);
		}
		assert_eq!(TxType::from_tag(0x7e), None);
	}
}
