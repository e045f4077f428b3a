//! JSON-RPC pool source.
//!
//! Queries `txpool_content` for the pool and `eth_getTransactionReceipt` for
//! receipts over HTTP. Extra headers (e.g. bearer tokens for hosted nodes)
//! are attached to every request.

use crate::{PollError, PoolSource};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_transport_http::Http;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use txwatch_types::{
	ConfigSchema, Field, FieldType, MineStatus, MinedInfo, PoolContent, Schema, TxHash,
	ValidationError,
};

pub struct RpcPoolSource {
	provider: RootProvider<Http<reqwest::Client>>,
}

impl RpcPoolSource {
	pub fn new(url: &str, headers: &[(String, String)]) -> Result<Self, PollError> {
		let url = url
			.parse::<reqwest::Url>()
			.map_err(|e| PollError::Configuration(format!("Invalid url '{}': {}", url, e)))?;

		let mut header_map = HeaderMap::new();
		for (name, value) in headers {
			let name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|e| PollError::Configuration(format!("Invalid header name: {}", e)))?;
			let value = HeaderValue::from_str(value).map_err(|e| {
				PollError::Configuration(format!("Invalid value for header {}: {}", name, e))
			})?;
			header_map.insert(name, value);
		}

		let client = reqwest::Client::builder()
			.default_headers(header_map)
			.build()
			.map_err(|e| PollError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		let rpc = RpcClient::new(Http::with_client(client, url), false);

		Ok(Self {
			provider: RootProvider::new(rpc),
		})
	}
}

#[async_trait]
impl PoolSource for RpcPoolSource {
	async fn fetch_pool(&self) -> Result<PoolContent, PollError> {
		// Decode into raw JSON per record so that one bad entry is isolated later.
		self.provider
			.raw_request::<_, PoolContent>("txpool_content".into(), ())
			.await
			.map_err(|e| PollError::Network(format!("txpool_content failed: {}", e)))
	}

	async fn receipt(&self, hash: TxHash) -> Result<Option<MinedInfo>, PollError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| PollError::Network(format!("Failed to get receipt: {}", e)))?;

		let Some(receipt) = receipt else {
			return Ok(None);
		};
		// A receipt without block data has not been included yet.
		let (Some(block_number), Some(block_hash)) = (receipt.block_number, receipt.block_hash)
		else {
			return Ok(None);
		};

		Ok(Some(MinedInfo {
			block_number,
			block_hash,
			gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
			status: Some(if receipt.status() {
				MineStatus::Success
			} else {
				MineStatus::Failed
			}),
		}))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcPoolSourceSchema)
	}
}

/// Configuration schema for the RPC pool source.
pub struct RpcPoolSourceSchema;

impl ConfigSchema for RpcPoolSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::Url)],
			vec![
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("auth_headers", FieldType::StringMap),
			],
		)
		.validate(config)
	}
}

/// Creates an RPC pool source.
///
/// Configuration parameters:
/// - `url` (required): HTTP(S) JSON-RPC endpoint
/// - `auth_headers` (optional): table of extra request headers
pub fn create_source(config: &toml::Value) -> Result<Box<dyn PoolSource>, PollError> {
	RpcPoolSourceSchema
		.validate(config)
		.map_err(|e| PollError::Configuration(format!("Invalid configuration: {}", e)))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PollError::Configuration("url is required".to_string()))?;
	let headers: Vec<(String, String)> = config
		.get("auth_headers")
		.and_then(|v| v.as_table())
		.map(|table| {
			table
				.iter()
				.filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
				.collect()
		})
		.unwrap_or_default();

	Ok(Box::new(RpcPoolSource::new(url, &headers)?))
}

/// Registry for the RPC pool source.
pub struct Registry;

impl txwatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "rpc";
	type Factory = crate::PoolSourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::PoolSourceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_schema() {
		let ok: toml::Value = toml::from_str(
			r#"
url = "https://node.example"
chain_id = 1
[auth_headers]
Authorization = "Bearer token"
"#,
		)
		.unwrap();
		assert!(RpcPoolSourceSchema.validate(&ok).is_ok());

		let missing: toml::Value = toml::from_str("chain_id = 1").unwrap();
		assert!(create_source(&missing).is_err());
	}

	#[test]
	fn test_factory_rejects_bad_header() {
		let config: toml::Value = toml::from_str(
			r#"
url = "http://localhost:8545"
[auth_headers]
"bad header" = "x"
"#,
		)
		.unwrap();
		assert!(matches!(
			create_source(&config),
			Err(PollError::Configuration(_))
		));
	}

	#[test]
	fn test_factory_builds_source() {
		let config: toml::Value = toml::from_str(r#"url = "http://localhost:8545""#).unwrap();
		assert!(create_source(&config).is_ok());
	}
}
