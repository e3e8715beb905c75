//! Watch-to-dispatch engine: turns assignment-change events into parallel,
//! failure-isolated directive executions.

mod engine;
mod runner;
mod worker;
pub use engine::*;
pub use runner::*;
pub use worker::*;


use crate::ExecutionError;
use crate::KvEntry;

/// One assignment read from the store: the raw directive string and the
/// key it was read from. Never cached across events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveEntry {
    pub key: String,
    pub raw: String,
}

impl From<KvEntry> for DirectiveEntry {
    fn from(entry: KvEntry) -> Self {
        Self {
            key: entry.key,
            raw: entry.value,
        }
    }
}

/// Outcome of one directive execution, reported back for observability
/// only. Failures never reach the store and never carry retry state.
#[derive(Debug)]
pub struct ExecutionResult {
    pub directive: DirectiveEntry,
    /// Combined stdout/stderr on success, the failure cause otherwise
    pub outcome: std::result::Result<String, ExecutionError>,
}
