//! Helpers for timestamps and hex formatting.

use crate::TxHash;
use std::str::FromStr;

/// Current unix time in seconds; 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Current unix time in milliseconds; 0 if the clock is before the epoch.
pub fn current_timestamp_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// Shortens a hex string for log output.
///
/// Keeps the `0x` prefix plus 8 characters followed by "..".
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Parses a 32-byte transaction hash, with or without `0x`.
pub fn parse_tx_hash(s: &str) -> Result<TxHash, String> {
	TxHash::from_str(s.trim()).map_err(|e| format!("invalid hash '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("0x1234"), "0x1234");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x12345678..");
	}

	#[test]
	fn test_parse_tx_hash() {
		let hash = format!("0x{}", "ab".repeat(32));
		assert_eq!(parse_tx_hash(&hash).unwrap(), TxHash::repeat_byte(0xab));
		assert_eq!(
			parse_tx_hash(&"cd".repeat(32)).unwrap(),
			TxHash::repeat_byte(0xcd)
		);
		assert!(parse_tx_hash("0x1234").is_err());
		assert!(parse_tx_hash("0xzz").is_err());
	}
}
