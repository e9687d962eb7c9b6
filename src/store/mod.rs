//! Run Store: the single source of truth for run status
//!
//! Every operation is scoped to one run id. Implementations serialize writes
//! per record (the in-memory store through its shard locks, Postgres through
//! a conditional `UPDATE`), so no global lock is involved.

pub mod memory;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

pub use memory::MemoryRunStore;

use crate::errors::RagRunError;
use crate::errors::Result;
use crate::models::ProgressNote;
use crate::models::RunRecord;
use crate::models::RunStatus;
use crate::models::Transition;
use crate::models::TransitionOutcome;

/// Upper bound for `list_runs`
pub const MAX_LIST_LIMIT: usize = 500;

/// Persistence for run records
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new `pending` record; fails with `DuplicateRun` if the id exists
    async fn create_run(&self, id: &str, question: &str) -> Result<RunRecord>;

    /// Load a record; fails with `RunNotFound` if the id is unknown
    async fn load_run(&self, id: &str) -> Result<RunRecord>;

    /// Apply a transition if the current status legally precedes its target
    ///
    /// A record that is already terminal is left untouched and reported as
    /// [`TransitionOutcome::AlreadyTerminal`] rather than as an error.
    async fn transition(&self, id: &str, transition: Transition) -> Result<TransitionOutcome>;

    /// Append an observability note; returns `false` if the record is terminal
    async fn record_progress(&self, id: &str, note: ProgressNote) -> Result<bool>;

    /// Newest runs first, optionally filtered by status
    async fn list_runs(&self, status: Option<RunStatus>, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Shared input checks for `create_run`
pub fn validate_new_run(id: &str, question: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RagRunError::Validation("Run id must not be empty".to_string()));
    }
    if question.trim().is_empty() {
        return Err(RagRunError::Validation("Question is required".to_string()));
    }
    Ok(())
}

/// Log transitions that did not apply
pub(crate) fn log_outcome(id: &str, requested: RunStatus, outcome: &TransitionOutcome) {
    match outcome {
        TransitionOutcome::Applied(record) => {
            debug!("Run {} -> {}", id, record.status);
        }
        TransitionOutcome::AlreadyTerminal(record) => {
            debug!(
                "Skipped transition of run {} to {}: already {}",
                id, requested, record.status
            );
        }
        TransitionOutcome::Rejected(record) => {
            let rejected = RagRunError::InvalidTransition {
                run_id: id.to_string(),
                from: record.status,
                to: requested,
            };
            warn!("{}", rejected);
        }
    }
}
