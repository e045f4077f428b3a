//! Per-endpoint monitoring tasks.

pub mod poller;
pub mod reaper;

pub use poller::PoolMonitor;
pub use reaper::{AbsenceReaper, ReapSummary};
