//! Pipeline Controller: drives one run through its four stages
//!
//! `launch` returns immediately. The run executes on a tracked task, inside
//! a supervisor that turns any error or panic escaping the stage sequence
//! into a terminal `failed` record and a final notification.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::context::ContextAssembler;
use super::stages::GenerationParams;
use super::stages::RetrievedDocument;
use super::stages::StageOutput;
use super::stages::StageSet;
use crate::config::AppConfig;
use crate::errors::RagRunError;
use crate::errors::Result;
use crate::models::ProgressNote;
use crate::models::RunRecord;
use crate::models::RunResult;
use crate::models::RunStatus;
use crate::models::Stage;
use crate::models::StageTrace;
use crate::models::Transition;
use crate::models::TransitionOutcome;
use crate::notify::ProgressSink;
use crate::notify::RunUpdate;
use crate::store::RunStore;

/// Answer given when retrieval produced nothing to ground on
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "I don't have enough information in the indexed documents to answer this question.";

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub max_context_chars: usize,
    pub generation: GenerationParams,
    /// Per-stage watchdog; `None` lets a stalled capability stall the run
    pub stage_timeout: Option<Duration>,
}

impl PipelineOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            max_context_chars: config.retrieval.max_context_chars,
            generation: GenerationParams {
                temperature: config.pipeline.temperature,
                max_tokens: config.pipeline.max_tokens,
            },
            stage_timeout: config.stage_timeout(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// How a launched run ended, from the launcher's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// Another invocation owns the run; nothing was executed
    Skipped(RunStatus),
}

pub struct PipelineController {
    store: Arc<dyn RunStore>,
    stages: StageSet,
    notifier: Option<Arc<dyn ProgressSink>>,
    options: PipelineOptions,
    assembler: ContextAssembler,
    tracker: TaskTracker,
}

impl PipelineController {
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>, stages: StageSet, options: PipelineOptions) -> Self {
        Self {
            assembler: ContextAssembler::new(options.max_context_chars),
            store,
            stages,
            notifier: None,
            options,
            tracker: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    #[must_use]
    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Tracker holding every launched run
    #[must_use]
    pub const fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Create a `pending` run and launch it; the returned record is `pending`
    pub async fn submit(
        self: &Arc<Self>,
        run_id: &str,
        question: &str,
    ) -> Result<(RunRecord, JoinHandle<RunOutcome>)> {
        let record = self.store.create_run(run_id, question).await?;
        info!("📝 Run {} created", record.id);
        let handle = self.launch(record.id.clone());
        Ok((record, handle))
    }

    /// Start a run in the background without waiting for it
    ///
    /// Launching the same id twice is harmless: only the invocation that
    /// moves the record out of `pending` executes the stages.
    pub fn launch(self: &Arc<Self>, run_id: impl Into<String>) -> JoinHandle<RunOutcome> {
        let controller = Arc::clone(self);
        let run_id = run_id.into();
        self.tracker.spawn(async move { controller.supervise(run_id).await })
    }

    /// Stop accepting runs and wait for in-flight ones, up to `grace`
    ///
    /// Returns `false` if some runs were still going when `grace` expired.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            true
        } else {
            warn!(
                "⚠️  {} run(s) still in flight after {}s",
                self.tracker.len(),
                grace.as_secs()
            );
            false
        }
    }

    async fn supervise(self: Arc<Self>, run_id: String) -> RunOutcome {
        let started = Instant::now();
        let worker = Arc::clone(&self);
        let id = run_id.clone();
        let joined = tokio::spawn(async move { worker.execute(&id).await }).await;

        let message = match joined {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => describe_join_error(join_error),
        };

        error!("❌ Run {} aborted: {}", run_id, message);
        match self
            .fail_run(&run_id, message.clone(), Some(elapsed_ms(started)))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Could not record failure of run {}: {}", run_id, e);
                RunOutcome::Failed(message)
            }
        }
    }

    /// Execute a run in the calling task
    ///
    /// Stage failures end the run as `failed` and are reported in the
    /// outcome. Only store errors are returned as `Err`.
    pub async fn execute(&self, run_id: &str) -> Result<RunOutcome> {
        let started = Instant::now();

        let record = match self.store.transition(run_id, Transition::Start).await? {
            TransitionOutcome::Applied(record) => record,
            other => {
                let status = other.record().status;
                info!("Run {} is already {}, not executing it again", run_id, status);
                return Ok(RunOutcome::Skipped(status));
            }
        };

        info!("🚀 Run {} started", run_id);
        self.notify(run_id, RunUpdate::status(RunStatus::Running))
            .await;

        match self.run_stages(run_id, &record.question, started).await {
            Ok(result) => self.complete_run(run_id, result).await,
            Err(e) => {
                self.fail_run(run_id, e.to_string(), Some(elapsed_ms(started)))
                    .await
            }
        }
    }

    async fn run_stages(&self, run_id: &str, question: &str, started: Instant) -> Result<RunResult> {
        let mut traces = Vec::with_capacity(Stage::ALL.len());

        let embedding = self
            .run_stage(run_id, Stage::Embedding, &mut traces, async {
                let embedding = self.stages.embedder.embed(question).await?;
                if embedding.is_empty() {
                    return Err(RagRunError::StageFailure {
                        stage: Stage::Embedding,
                        message: "Embedder returned an empty vector".to_string(),
                    });
                }
                let output = StageOutput::Embedding {
                    dimensions: embedding.len(),
                };
                Ok::<_, RagRunError>((embedding, output))
            })
            .await?;

        let hits = self
            .run_stage(run_id, Stage::Search, &mut traces, async {
                let mut hits = self
                    .stages
                    .search
                    .search(&embedding, self.options.top_k)
                    .await?;
                if let Some(floor) = self.options.min_score {
                    hits.retain(|hit| hit.score >= floor);
                }
                let output = StageOutput::Search {
                    hits: hits.len(),
                    top_score: hits.iter().map(|hit| hit.score).reduce(f32::max),
                };
                Ok::<_, RagRunError>((hits, output))
            })
            .await?;

        let (context, documents) = self
            .run_stage(run_id, Stage::Retrieval, &mut traces, async {
                let retrieved = if hits.is_empty() {
                    Vec::new()
                } else {
                    let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
                    let mut by_id: HashMap<String, _> = self
                        .stages
                        .documents
                        .fetch(&ids)
                        .await?
                        .into_iter()
                        .map(|document| (document.id.clone(), document))
                        .collect();
                    // Keep search order; ids the source no longer has are skipped
                    hits.iter()
                        .filter_map(|hit| {
                            by_id.remove(&hit.id).map(|document| RetrievedDocument {
                                document,
                                score: hit.score,
                            })
                        })
                        .collect::<Vec<_>>()
                };

                let (context, documents) = self.assembler.assemble(&retrieved);
                let output = StageOutput::Retrieval {
                    documents: documents.len(),
                    context_chars: context.chars().count(),
                };
                Ok::<_, RagRunError>(((context, documents), output))
            })
            .await?;

        let answer = self
            .run_stage(run_id, Stage::Synthesis, &mut traces, async {
                let insufficient_context = context.trim().is_empty();
                let answer = if insufficient_context {
                    debug!("Run {} has no context; skipping the model", run_id);
                    INSUFFICIENT_INFORMATION_ANSWER.to_string()
                } else {
                    self.stages
                        .synthesizer
                        .synthesize(question, &context, self.options.generation)
                        .await?
                };
                if answer.trim().is_empty() {
                    return Err(RagRunError::StageFailure {
                        stage: Stage::Synthesis,
                        message: "Synthesizer returned an empty answer".to_string(),
                    });
                }
                let output = StageOutput::Synthesis {
                    answer_chars: answer.chars().count(),
                    insufficient_context,
                };
                Ok::<_, RagRunError>((answer, output))
            })
            .await?;

        Ok(RunResult {
            answer,
            documents,
            stages: traces,
            total_ms: elapsed_ms(started),
        })
    }

    /// Run one stage with the optional watchdog, then record and announce it
    async fn run_stage<T, F>(
        &self,
        run_id: &str,
        stage: Stage,
        traces: &mut Vec<StageTrace>,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<(T, StageOutput)>>,
    {
        let stage_started = Instant::now();
        let outcome = match self.options.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RagRunError::Timeout(limit)),
            },
            None => work.await,
        };
        let elapsed = elapsed_ms(stage_started);

        let (value, output) = match outcome {
            Ok(produced) => produced,
            Err(e) => {
                let failure = match e {
                    RagRunError::StageFailure { .. } => e,
                    other => RagRunError::StageFailure {
                        stage,
                        message: other.to_string(),
                    },
                };
                warn!("Run {}: {}", run_id, failure);
                self.notify(run_id, RunUpdate::stage_failed(stage, failure.to_string(), elapsed))
                    .await;
                return Err(failure);
            }
        };

        let summary = output.summary();
        debug!("Run {} {} done in {}ms: {}", run_id, stage, elapsed, summary);
        traces.push(StageTrace {
            stage,
            elapsed_ms: elapsed,
            summary: summary.clone(),
        });

        match self
            .store
            .record_progress(run_id, ProgressNote::new(stage, elapsed, summary))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("Run {} is terminal; progress note dropped", run_id),
            Err(e) => warn!("Failed to record progress for run {}: {}", run_id, e),
        }

        self.notify(run_id, RunUpdate::stage_completed(&output, elapsed))
            .await;
        Ok(value)
    }

    async fn complete_run(&self, run_id: &str, result: RunResult) -> Result<RunOutcome> {
        let update = RunUpdate::completed(&result);
        let total_ms = result.total_ms;
        match self
            .store
            .transition(run_id, Transition::Complete(result))
            .await?
        {
            TransitionOutcome::Applied(_) => {
                info!("✅ Run {} completed in {}ms", run_id, total_ms);
                self.notify(run_id, update).await;
                Ok(RunOutcome::Completed)
            }
            other => Ok(RunOutcome::Skipped(other.record().status)),
        }
    }

    /// Move a run to `failed` and tell subscribers; a no-op if it already ended
    async fn fail_run(
        &self,
        run_id: &str,
        message: String,
        elapsed: Option<u64>,
    ) -> Result<RunOutcome> {
        match self
            .store
            .transition(run_id, Transition::Fail(message.clone()))
            .await?
        {
            TransitionOutcome::Applied(_) => {
                error!("❌ Run {} failed: {}", run_id, message);
                self.notify(run_id, RunUpdate::failed(message.clone(), elapsed))
                    .await;
                Ok(RunOutcome::Failed(message))
            }
            other => Ok(RunOutcome::Skipped(other.record().status)),
        }
    }

    async fn notify(&self, run_id: &str, update: RunUpdate) {
        if let Some(notifier) = &self.notifier {
            notifier.publish_update(run_id, update).await;
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn describe_join_error(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return format!("Pipeline task was cancelled: {join_error}");
    }
    let panic = join_error.into_panic();
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Pipeline panicked: {detail}")
}
