use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::RagRunError;

/// Lifecycle status of a run
///
/// Runs only ever walk `pending -> running -> {completed | failed}`.
/// A run that cannot be started may also go straight from `pending` to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Statuses from which `self` may legally be entered
    #[must_use]
    pub const fn predecessors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[],
            Self::Running => &[Self::Pending],
            Self::Completed => &[Self::Running],
            Self::Failed => &[Self::Pending, Self::Running],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next.predecessors().contains(&self)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = RagRunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(RagRunError::Validation(format!("Unknown run status: {other}"))),
        }
    }
}

/// One step of the retrieval-and-generation pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Turn the question into a vector
    Embedding,
    /// Nearest-neighbour search over the vector index
    Search,
    /// Fetch document bodies for the search hits
    Retrieval,
    /// Produce the answer with the language model
    Synthesis,
}

impl Stage {
    pub const ALL: [Self; 4] = [Self::Embedding, Self::Search, Self::Retrieval, Self::Synthesis];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Search => "search",
            Self::Retrieval => "retrieval",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document that contributed to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f32,
}

/// Timing and a short summary of one finished stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTrace {
    pub stage: Stage,
    pub elapsed_ms: u64,
    pub summary: String,
}

/// Output of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub answer: String,
    pub documents: Vec<DocumentRef>,
    pub stages: Vec<StageTrace>,
    pub total_ms: u64,
}

impl RunResult {
    /// Latency of a single stage, if it ran
    #[must_use]
    pub fn stage_latency(&self, stage: Stage) -> Option<u64> {
        self.stages
            .iter()
            .find(|trace| trace.stage == stage)
            .map(|trace| trace.elapsed_ms)
    }
}

/// Observability note written after each stage; does not change status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub stage: Stage,
    pub elapsed_ms: u64,
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl ProgressNote {
    #[must_use]
    pub fn new(stage: Stage, elapsed_ms: u64, summary: impl Into<String>) -> Self {
        Self {
            stage,
            elapsed_ms,
            summary: summary.into(),
            at: Utc::now(),
        }
    }
}

/// A requested status change together with the payload it carries
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Start,
    Complete(RunResult),
    Fail(String),
}

impl Transition {
    #[must_use]
    pub const fn target(&self) -> RunStatus {
        match self {
            Self::Start => RunStatus::Running,
            Self::Complete(_) => RunStatus::Completed,
            Self::Fail(_) => RunStatus::Failed,
        }
    }
}

/// Result of asking the store to apply a [`Transition`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The record moved to the requested status
    Applied(RunRecord),
    /// The record was already terminal; nothing changed
    AlreadyTerminal(RunRecord),
    /// The current status does not precede the requested one; nothing changed
    Rejected(RunRecord),
}

impl TransitionOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub const fn record(&self) -> &RunRecord {
        match self {
            Self::Applied(record) | Self::AlreadyTerminal(record) | Self::Rejected(record) => {
                record
            }
        }
    }
}

/// Canonical state of one submitted question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub question: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress: Vec<ProgressNote>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            status: RunStatus::Pending,
            result: None,
            error: None,
            progress: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition in place, enforcing the state machine
    ///
    /// Returns `true` when the record changed. Status, payload and
    /// `completed_at` are written together.
    pub fn apply(&mut self, transition: Transition) -> bool {
        if self.is_terminal() || !self.status.can_transition_to(transition.target()) {
            return false;
        }

        self.status = transition.target();
        match transition {
            Transition::Start => {}
            Transition::Complete(result) => {
                self.result = Some(result);
                self.completed_at = Some(Utc::now());
            }
            Transition::Fail(error) => {
                self.error = Some(error);
                self.completed_at = Some(Utc::now());
            }
        }
        true
    }

    /// Append a progress note unless the record is already terminal
    pub fn note_progress(&mut self, note: ProgressNote) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress.push(note);
        true
    }
}

/// Generate a fresh run identifier
#[must_use]
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as an RFC 3339 string, used on the wire
#[must_use]
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339()
}
