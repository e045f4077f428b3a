//! Storage module for the txpool-watch system.
//!
//! Records are kept as JSON under `namespace:id` keys in a pluggable byte
//! store. The monitor stores one record per `(hash, client)` pair under
//! `txs:<hash>:<client>`, so every client's view of a hash shares the prefix
//! `txs:<hash>:` and can be read back with a single prefix scan.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use txwatch_types::{ConfigSchema, ImplementationRegistry};

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface for byte-oriented storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the values of every live key starting with `prefix`, ordered by key.
	///
	/// A value written completely before the call starts is always included.
	/// A concurrent write is either fully visible or not visible at all.
	async fn list_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed storage on top of a byte backend.
///
/// Values are serialized to JSON and a whole value is written in one
/// `set_bytes` call, so readers never observe a partially updated record.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = format!("{}:{}", namespace, id);
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes, ttl).await
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let key = format!("{}:{}", namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps `NotFound` to `None`.
	pub async fn try_retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Lists all values whose id starts with `id_prefix` within a namespace.
	///
	/// Results come back in key order.
	pub async fn list<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id_prefix: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:{}", namespace, id_prefix);
		self.backend
			.list_prefix(&prefix)
			.await?
			.iter()
			.map(|bytes| {
				serde_json::from_slice(bytes)
					.map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Counts the values whose id starts with `id_prefix` within a namespace.
	pub async fn count(&self, namespace: &str, id_prefix: &str) -> Result<usize, StorageError> {
		let prefix = format!("{}:{}", namespace, id_prefix);
		Ok(self.backend.list_prefix(&prefix).await?.len())
	}

	/// Removes expired entries from storage. A no-op for backends without TTL.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Entry {
		client: String,
		nonce: u64,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_list_scopes_to_prefix() {
		let storage = service();
		for client in ["geth", "reth"] {
			let entry = Entry {
				client: client.to_string(),
				nonce: 1,
			};
			storage
				.store("txs", &format!("0xaa:{}", client), &entry)
				.await
				.unwrap();
		}
		storage
			.store(
				"txs",
				"0xab:geth",
				&Entry {
					client: "geth".into(),
					nonce: 2,
				},
			)
			.await
			.unwrap();

		let listed: Vec<Entry> = storage.list("txs", "0xaa:").await.unwrap();
		assert_eq!(listed.len(), 2);
		assert_eq!(listed[0].client, "geth");
		assert_eq!(listed[1].client, "reth");
		assert_eq!(storage.count("txs", "0xa").await.unwrap(), 3);
		assert_eq!(storage.count("inclusion_reports", "").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_try_retrieve_missing() {
		let storage = service();
		let missing: Option<Entry> = storage.try_retrieve("txs", "0x00:geth").await.unwrap();
		assert!(missing.is_none());

		let result: Result<Entry, _> = storage.retrieve("txs", "0x00:geth").await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["file", "memory"]);
	}
}
