//! Configuration module for the txpool-watch system.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}` references
//! are resolved from the environment before parsing, and a file may pull in
//! other files with `include = ["endpoints.toml"]`. Each top-level section must
//! be defined in exactly one file.

pub mod builders;
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use builders::config::ConfigBuilder;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The default display includes the whole input; keep only the message.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub monitor: MonitorConfig,
	#[serde(default)]
	pub polling: PollingConfig,
	pub endpoints: Vec<EndpointConfig>,
	pub storage: StorageConfig,
	pub inclusion: Option<InclusionConfig>,
	#[serde(default)]
	pub reaper: ReaperConfig,
	pub api: Option<ApiConfig>,
}

/// Identity of this monitor instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
	pub id: String,
}

/// Poll cadence shared by every endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
	#[serde(default = "default_poll_interval_ms")]
	pub interval_ms: u64,
	/// Upper bound on one fetch, including response decoding.
	#[serde(default = "default_poll_timeout_ms")]
	pub timeout_ms: u64,
}

impl PollingConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			interval_ms: default_poll_interval_ms(),
			timeout_ms: default_poll_timeout_ms(),
		}
	}
}

fn default_poll_interval_ms() -> u64 {
	2_000
}

fn default_poll_timeout_ms() -> u64 {
	1_500
}

/// One node endpoint to poll.
///
/// `name` becomes the client identifier attached to every observation.
/// Keys other than `name` and `source` are handed to the pool source
/// implementation, which validates them against its own schema.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
	pub name: String,
	#[serde(default = "default_pool_source")]
	pub source: String,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl EndpointConfig {
	/// Implementation settings as a TOML value, ready for a factory.
	pub fn settings_value(&self) -> toml::Value {
		toml::Value::Table(self.settings.clone())
	}
}

fn default_pool_source() -> String {
	"rpc".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3_600
}

/// Inclusion-list announcement source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InclusionConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_announcement_source")]
	pub source: String,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl InclusionConfig {
	pub fn settings_value(&self) -> toml::Value {
		toml::Value::Table(self.settings.clone())
	}
}

fn default_announcement_source() -> String {
	"beacon".to_string()
}

/// Absence-based mined/dropped detection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperConfig {
	#[serde(default = "default_reaper_enabled")]
	pub enabled: bool,
}

impl Default for ReaperConfig {
	fn default() -> Self {
		Self {
			enabled: default_reaper_enabled(),
		}
	}
}

fn default_reaper_enabled() -> bool {
	true
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports defaults
/// with `${VAR_NAME:-default_value}`. Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};
		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply back to front so earlier offsets stay valid.
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.monitor.id.is_empty() {
			return Err(ConfigError::Validation("Monitor ID cannot be empty".into()));
		}

		if self.polling.interval_ms == 0 {
			return Err(ConfigError::Validation(
				"polling.interval_ms must be greater than 0".into(),
			));
		}
		if self.polling.timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"polling.timeout_ms must be greater than 0".into(),
			));
		}
		if self.polling.timeout_ms > self.polling.interval_ms {
			return Err(ConfigError::Validation(format!(
				"polling.timeout_ms ({}) cannot exceed polling.interval_ms ({})",
				self.polling.timeout_ms, self.polling.interval_ms
			)));
		}

		if self.endpoints.is_empty() {
			return Err(ConfigError::Validation(
				"At least one endpoint must be configured".into(),
			));
		}
		let mut names = HashSet::new();
		for endpoint in &self.endpoints {
			if endpoint.name.is_empty() {
				return Err(ConfigError::Validation(
					"Endpoint name cannot be empty".into(),
				));
			}
			if endpoint.name.contains(':') {
				return Err(ConfigError::Validation(format!(
					"Endpoint name '{}' cannot contain ':'",
					endpoint.name
				)));
			}
			if !names.insert(endpoint.name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate endpoint name '{}'",
					endpoint.name
				)));
			}
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' is not among the configured implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"storage.cleanup_interval_seconds must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving env vars and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
