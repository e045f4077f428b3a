//! File-based storage backend.
//!
//! Keys are split on `:` and each segment becomes one path component, so
//! `txs:<hash>:<client>` lives at `txs/<hash>/<client>.bin` and a prefix scan
//! only reads the directories the prefix names. Segments are escaped one to
//! one: ASCII letters, digits, `-` and `_` are kept and every other byte is
//! written as `%XX`.
//!
//! Files start with a fixed header carrying the expiry time, followed by the
//! JSON payload. Writes go to a temporary file that is then renamed over the
//! target, so a reader sees either the old or the new content.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use txwatch_types::{
	current_timestamp, ConfigSchema, Field, FieldType, Schema, StorageKey, ValidationError,
};

const EXTENSION: &str = "bin";

/// Distinguishes temp files of overlapping writes to the same key.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fixed-size file header.
///
/// Layout (32 bytes): magic `TXWS`, version (u16 LE), expiry in unix seconds
/// (u64 LE, 0 = never), then zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"TXWS";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs())
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing storage header".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}
		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Per-namespace default TTLs, read from `ttl_<namespace>` keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter(StorageKey::allows_ttl)
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.map(|secs| (key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.and_then(|namespace| self.ttls.get(&namespace).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// Escapes one key segment into a file name component.
fn encode_segment(segment: &str) -> String {
	let mut encoded = String::with_capacity(segment.len());
	for byte in segment.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			encoded.push(byte as char);
		} else {
			let _ = write!(encoded, "%{:02X}", byte);
		}
	}
	encoded
}

fn decode_segment(encoded: &str) -> Option<String> {
	let bytes = encoded.as_bytes();
	let mut decoded = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = encoded.get(i + 1..i + 3)?;
			decoded.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			decoded.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(decoded).ok()
}

pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn file_path(&self, key: &str) -> PathBuf {
		let mut segments: Vec<String> = key.split(':').map(encode_segment).collect();
		let file = segments.pop().unwrap_or_default();
		let mut path = self.base_path.clone();
		path.extend(segments);
		path.join(format!("{}.{}", file, EXTENSION))
	}

	/// Reads a file and strips its header. Expired or vanished files read as `None`.
	async fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		let header = FileHeader::decode(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	/// Storage files whose key starts with `prefix`, as (key, path) in key order.
	///
	/// Complete segments of the prefix select a directory; the trailing
	/// partial segment filters that directory's entries.
	async fn entries(&self, prefix: &str) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut segments: Vec<&str> = prefix.split(':').collect();
		let partial = encode_segment(segments.pop().unwrap_or_default());
		let mut root = self.base_path.clone();
		root.extend(segments.iter().map(|s| encode_segment(s)));
		let key_prefix: String = segments.iter().map(|s| format!("{}:", s)).collect();

		let mut entries = Vec::new();
		let mut pending = vec![(root, key_prefix, Some(partial))];
		while let Some((dir_path, key_prefix, filter)) = pending.pop() {
			let mut dir = match fs::read_dir(&dir_path).await {
				Ok(dir) => dir,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(StorageError::Backend(e.to_string())),
			};
			while let Some(entry) = dir
				.next_entry()
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?
			{
				let path = entry.path();
				let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
					continue;
				};
				let (stem, is_file) = match name.strip_suffix(&format!(".{}", EXTENSION)) {
					Some(stem) => (stem.to_string(), true),
					None if !name.contains('.') => (name.to_string(), false),
					None => continue,
				};
				if filter.as_ref().is_some_and(|f| !stem.starts_with(f.as_str())) {
					continue;
				}
				let Some(segment) = decode_segment(&stem) else {
					continue;
				};
				if is_file {
					entries.push((format!("{}{}", key_prefix, segment), path));
				} else {
					pending.push((path, format!("{}{}:", key_prefix, segment), None));
				}
			}
		}
		entries.sort();
		Ok(entries)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_live(&self.file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		let dir = path.parent().unwrap_or(&self.base_path).to_path_buf();
		fs::create_dir_all(&dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key));
		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&FileHeader::new(ttl).encode());
		file_data.extend_from_slice(&value);

		let temp_path = dir.join(format!(
			"{}.tmp",
			TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
		));
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(Self::read_live(&self.file_path(key)).await?.is_some())
	}

	async fn list_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let mut values = Vec::new();
		for (_, path) in self.entries(prefix).await? {
			if let Some(value) = Self::read_live(&path).await? {
				values.push(value);
			}
		}
		Ok(values)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for (_, path) in self.entries("").await? {
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable file");
					continue;
				},
			};
			let Ok(header) = FileHeader::decode(&data) else {
				continue;
			};
			if !header.is_expired() {
				continue;
			}
			match fs::remove_file(&path).await {
				Ok(()) => removed += 1,
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired file")
				},
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		for key in StorageKey::all().filter(|key| !key.allows_ttl()) {
			let field = format!("ttl_{}", key.as_str());
			if config.get(&field).is_some() {
				return Err(ValidationError::InvalidValue {
					field,
					message: "this namespace is append-only and cannot expire".into(),
				});
			}
		}
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		for key in StorageKey::all().filter(StorageKey::allows_ttl) {
			optional.push(Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional).validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_txs`: TTL in seconds for transaction records (default: 0, never).
///   Inclusion reports never expire.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl txwatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[tokio::test]
	async fn test_roundtrip_and_delete() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("txs:0x01:geth", b"payload".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("txs:0x01:geth").await.unwrap(),
			b"payload".to_vec()
		);
		assert!(dir.path().join("txs").join("0x01").join("geth.bin").exists());

		storage.delete("txs:0x01:geth").await.unwrap();
		assert!(matches!(
			storage.get_bytes("txs:0x01:geth").await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine.
		storage.delete("txs:0x01:geth").await.unwrap();
	}

	#[tokio::test]
	async fn test_list_prefix() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		assert!(storage.list_prefix("txs:").await.unwrap().is_empty());

		for (key, value) in [
			("txs:0x01:reth", "r"),
			("txs:0x01:geth", "g"),
			("txs:0x02:geth", "x"),
		] {
			storage
				.set_bytes(key, value.as_bytes().to_vec(), None)
				.await
				.unwrap();
		}

		let values = storage.list_prefix("txs:0x01:").await.unwrap();
		assert_eq!(values, vec![b"g".to_vec(), b"r".to_vec()]);
		assert_eq!(storage.list_prefix("txs:").await.unwrap().len(), 3);
		assert_eq!(storage.list_prefix("txs:0x0").await.unwrap().len(), 3);
		assert_eq!(storage.list_prefix("").await.unwrap().len(), 3);
		assert_eq!(
			storage.list_prefix("txs:0x01:r").await.unwrap(),
			vec![b"r".to_vec()]
		);
	}

	#[tokio::test]
	async fn test_keys_with_separator_characters_stay_distinct() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		for (key, value) in [
			("txs:0x01:a_b", "underscore"),
			("txs:0x01:a/b", "slash"),
			("txs:0x01:a%2Fb", "escaped"),
			("txs:0x01:..", "dots"),
		] {
			storage
				.set_bytes(key, value.as_bytes().to_vec(), None)
				.await
				.unwrap();
		}

		assert_eq!(storage.get_bytes("txs:0x01:a_b").await.unwrap(), b"underscore");
		assert_eq!(storage.get_bytes("txs:0x01:a/b").await.unwrap(), b"slash");
		assert_eq!(storage.get_bytes("txs:0x01:a%2Fb").await.unwrap(), b"escaped");
		assert_eq!(storage.get_bytes("txs:0x01:..").await.unwrap(), b"dots");
		assert_eq!(storage.list_prefix("txs:0x01:").await.unwrap().len(), 4);
		assert_eq!(storage.list_prefix("txs:0x01:a").await.unwrap().len(), 3);
	}

	#[test]
	fn test_segment_encoding() {
		assert_eq!(encode_segment("geth-1_a"), "geth-1_a");
		assert_eq!(encode_segment("a/b"), "a%2Fb");
		assert_eq!(encode_segment("a%b"), "a%25b");
		for raw in ["a/b", "..", "ünï", "x y"] {
			assert_eq!(decode_segment(&encode_segment(raw)).as_deref(), Some(raw));
		}
	}

	#[tokio::test]
	async fn test_expired_entries() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("txs:0x01:geth", b"live".to_vec(), None)
			.await
			.unwrap();

		// Hand-write an entry that expired at t=1.
		let mut expired = FileHeader {
			version: FileHeader::VERSION,
			expires_at: 1,
		}
		.encode()
		.to_vec();
		expired.extend_from_slice(b"old");
		let expired_dir = dir.path().join("txs").join("0x02");
		std::fs::create_dir_all(&expired_dir).unwrap();
		std::fs::write(expired_dir.join("geth.bin"), expired).unwrap();

		assert!(!storage.exists("txs:0x02:geth").await.unwrap());
		assert_eq!(storage.list_prefix("txs:").await.unwrap().len(), 1);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!expired_dir.join("geth.bin").exists());
		assert!(storage.exists("txs:0x01:geth").await.unwrap());
	}

	#[test]
	fn test_ttl_config_by_namespace() {
		let config: toml::Value = toml::from_str("ttl_txs = 60").unwrap();
		let ttl = TtlConfig::from_config(&config);
		assert_eq!(ttl.ttl_for_key("txs:0x01:geth"), Duration::from_secs(60));
		assert_eq!(ttl.ttl_for_key("inclusion_reports:1:0"), Duration::ZERO);
	}

	#[test]
	fn test_inclusion_reports_cannot_expire() {
		let config: toml::Value = toml::from_str("ttl_inclusion_reports = 60").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(m)) if m.contains("ttl_inclusion_reports")
		));
		assert_eq!(
			TtlConfig::from_config(&config).ttl_for_key("inclusion_reports:1:0"),
			Duration::ZERO
		);
	}

	#[test]
	fn test_schema_rejects_negative_ttl() {
		let config: toml::Value = toml::from_str("ttl_txs = -5").unwrap();
		assert!(create_storage(&config).is_err());
	}
}
