//! Core monitoring engine for the txpool-watch system.
//!
//! Pollers feed normalized pool records into the [`StateTracker`], which owns
//! every lifecycle transition. The [`DiffEngine`] and the
//! [`InclusionReconciler`] only read from it. [`MonitorBuilder`] assembles a
//! [`MonitorEngine`] from configuration and implementation factories.

pub mod builder;
pub mod diff;
pub mod engine;
pub mod inclusion;
pub mod monitoring;
pub mod state;

pub use builder::{BuilderError, MonitorBuilder, MonitorFactories};
pub use diff::{DiffEngine, DiffError};
pub use engine::{event_bus::EventBus, EngineError, MonitorEngine};
pub use inclusion::{InclusionError, InclusionReconciler};
pub use state::{StateError, StateTracker, UpsertOutcome};
