//! In-process run store backed by a sharded concurrent map

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::log_outcome;
use super::validate_new_run;
use super::RunStore;
use super::MAX_LIST_LIMIT;
use crate::errors::RagRunError;
use crate::errors::Result;
use crate::models::ProgressNote;
use crate::models::RunRecord;
use crate::models::RunStatus;
use crate::models::Transition;
use crate::models::TransitionOutcome;

/// Run store kept in memory; records are lost when the process exits
///
/// Each record lives in one DashMap shard, and every read-check-write
/// happens while that shard's lock is held, so writes to one run are
/// serialized without a global lock.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: DashMap<String, RunRecord>,
}

impl MemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, id: &str, question: &str) -> Result<RunRecord> {
        validate_new_run(id, question)?;

        match self.runs.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RagRunError::DuplicateRun(id.to_string())),
            Entry::Vacant(slot) => {
                let record = RunRecord::new(id, question);
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn load_run(&self, id: &str) -> Result<RunRecord> {
        self.runs
            .get(id)
            .map(|record| record.clone())
            .ok_or_else(|| RagRunError::RunNotFound(id.to_string()))
    }

    async fn transition(&self, id: &str, transition: Transition) -> Result<TransitionOutcome> {
        let requested = transition.target();
        let mut record = self
            .runs
            .get_mut(id)
            .ok_or_else(|| RagRunError::RunNotFound(id.to_string()))?;

        let outcome = if record.is_terminal() {
            TransitionOutcome::AlreadyTerminal(record.clone())
        } else if record.apply(transition) {
            TransitionOutcome::Applied(record.clone())
        } else {
            TransitionOutcome::Rejected(record.clone())
        };
        drop(record);

        log_outcome(id, requested, &outcome);
        Ok(outcome)
    }

    async fn record_progress(&self, id: &str, note: ProgressNote) -> Result<bool> {
        let mut record = self
            .runs
            .get_mut(id)
            .ok_or_else(|| RagRunError::RunNotFound(id.to_string()))?;
        Ok(record.note_progress(note))
    }

    async fn list_runs(&self, status: Option<RunStatus>, limit: usize) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| status.map_or(true, |s| entry.value().status == s))
            .map(|entry| entry.value().clone())
            .collect();

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit.min(MAX_LIST_LIMIT));
        Ok(runs)
    }
}
