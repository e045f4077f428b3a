//! Common types module for the txpool-watch system.
//!
//! This module defines the canonical records shared by every component: the
//! normalized transaction, its per-client lifecycle metadata, the cross-client
//! diff and the inclusion report. No behavior beyond small accessors lives here.

/// Cross-client comparison results.
pub mod diff;
/// Event types for observability and inter-service communication.
pub mod events;
/// Inclusion-list announcements and the reports computed from them.
pub mod inclusion;
/// Lifecycle status and per-client metadata.
pub mod metadata;
/// Node-native pool content as returned by an endpoint.
pub mod pool;
/// Filtering and grouping of stored transactions.
pub mod query;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// The canonical transaction record.
pub mod transaction;
/// Utility functions for timestamps and hex formatting.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use diff::*;
pub use events::*;
pub use inclusion::*;
pub use metadata::*;
pub use pool::*;
pub use query::{FilterCriteria, GroupBy, GroupedTransactions, Range};
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use transaction::*;
pub use utils::{current_timestamp, current_timestamp_millis, parse_tx_hash, truncate_id};
pub use validation::*;
