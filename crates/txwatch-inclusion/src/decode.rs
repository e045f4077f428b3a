//! Decoding of beacon-node inclusion-list events.
//!
//! The beacon node pushes `text/event-stream` frames. [`SseDecoder`] turns raw
//! body chunks into complete events, and [`decode_announcement`] turns the JSON
//! payload of an `inclusion_list` event into an [`InclusionAnnouncement`].
//!
//! Decoding is lenient about content: a missing or unparseable slot becomes
//! `None` and is rejected later by the reconciler, so the stream keeps going.

use crate::AnnouncementError;
use alloy_primitives::{keccak256, Bytes};
use serde::Deserialize;
use txwatch_types::{InclusionAnnouncement, TxHash};

/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
	pub event: Option<String>,
	pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Chunks may split lines or even UTF-8 sequences; bytes are buffered until a
/// blank line terminates an event.
#[derive(Debug, Default)]
pub struct SseDecoder {
	buffer: Vec<u8>,
	event: Option<String>,
	data: Vec<String>,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feeds a chunk and returns every event it completed.
	pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
		self.buffer.extend_from_slice(chunk);
		let mut events = Vec::new();

		while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
			let line: Vec<u8> = self.buffer.drain(..=pos).collect();
			let line = String::from_utf8_lossy(&line);
			let line = line.trim_end_matches(['\n', '\r']);

			if line.is_empty() {
				if !self.data.is_empty() {
					events.push(SseEvent {
						event: self.event.take(),
						data: self.data.join("\n"),
					});
					self.data.clear();
				}
				self.event = None;
				continue;
			}
			if line.starts_with(':') {
				continue;
			}

			let (field, value) = match line.split_once(':') {
				Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
				None => (line, ""),
			};
			match field {
				"event" => self.event = Some(value.to_string()),
				"data" => self.data.push(value.to_string()),
				_ => {},
			}
		}

		events
	}
}

#[derive(Debug, Deserialize)]
struct InclusionListMessage {
	#[serde(default)]
	slot: Option<String>,
	#[serde(default)]
	validator_index: Option<String>,
	#[serde(default)]
	transactions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignedInclusionList {
	message: InclusionListMessage,
	#[serde(default)]
	signature: Option<String>,
}

/// Events arrive either bare or wrapped in a `{version, data}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InclusionListPayload {
	Versioned {
		#[allow(dead_code)]
		version: Option<String>,
		data: SignedInclusionList,
	},
	Bare(SignedInclusionList),
}

/// Hash of one inclusion-list entry.
///
/// A 32-byte entry is already a transaction hash. Anything else is a raw
/// signed transaction and is hashed with keccak256.
pub fn entry_hash(entry: &str) -> Result<TxHash, AnnouncementError> {
	let bytes = entry
		.trim()
		.parse::<Bytes>()
		.map_err(|e| AnnouncementError::Parse(format!("invalid transaction entry: {}", e)))?;
	if bytes.is_empty() {
		return Err(AnnouncementError::Parse("empty transaction entry".into()));
	}
	Ok(if bytes.len() == 32 {
		TxHash::from_slice(&bytes)
	} else {
		keccak256(&bytes)
	})
}

/// Decodes an `inclusion_list` event payload.
///
/// Entries that cannot be decoded are dropped with a warning; the rest of the
/// announcement is kept.
pub fn decode_announcement(data: &str) -> Result<InclusionAnnouncement, AnnouncementError> {
	let payload: InclusionListPayload = serde_json::from_str(data)
		.map_err(|e| AnnouncementError::Parse(format!("invalid inclusion list: {}", e)))?;
	let signed = match payload {
		InclusionListPayload::Versioned { data, .. } => data,
		InclusionListPayload::Bare(signed) => signed,
	};

	let slot = signed
		.message
		.slot
		.as_deref()
		.and_then(|s| s.trim().parse::<u64>().ok());
	let validator_index = signed
		.message
		.validator_index
		.as_deref()
		.and_then(|s| s.trim().parse::<u64>().ok());

	let transactions = signed
		.message
		.transactions
		.iter()
		.filter_map(|entry| match entry_hash(entry) {
			Ok(hash) => Some(hash),
			Err(e) => {
				tracing::warn!(slot = ?slot, error = %e, "Dropping undecodable inclusion list entry");
				None
			},
		})
		.collect();

	Ok(InclusionAnnouncement {
		slot,
		transactions,
		validator_index,
		signature: signed.signature,
	})
}
