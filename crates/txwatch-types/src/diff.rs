//! Cross-client comparison of a single transaction hash.

use crate::{ClientId, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name -> value.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Field name -> client -> value. Clients lacking the field have no entry.
pub type DivergentFields = BTreeMap<String, BTreeMap<ClientId, serde_json::Value>>;

/// Values identical across every client holding the hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxBlock {
	pub tx: FieldMap,
	pub metadata: FieldMap,
}

/// Per-client values for fields where the clients disagree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivergentBlock {
	pub tx: DivergentFields,
	pub metadata: DivergentFields,
}

/// Common/divergent split for one hash. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxDiff {
	pub hash: TxHash,
	pub clients: Vec<ClientId>,
	pub common: TxBlock,
	pub divergent: DivergentBlock,
}
