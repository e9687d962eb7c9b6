//! Fake stage capabilities and helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ragrun::models::RunRecord;
use ragrun::notify::ProgressSink;
use ragrun::notify::RunUpdate;
use ragrun::pipeline::AnswerSynthesizer;
use ragrun::pipeline::Document;
use ragrun::pipeline::DocumentSource;
use ragrun::pipeline::Embedder;
use ragrun::pipeline::GenerationParams;
use ragrun::pipeline::PipelineController;
use ragrun::pipeline::PipelineOptions;
use ragrun::pipeline::SearchHit;
use ragrun::pipeline::StageSet;
use ragrun::pipeline::VectorSearch;
use ragrun::store::MemoryRunStore;
use ragrun::store::RunStore;
use ragrun::RagRunError;
use ragrun::Result;

#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield so racing launches genuinely interleave
        tokio::task::yield_now().await;
        Ok(vec![0.1, 0.2, 0.3, 0.4])
    }
}

pub struct FakeSearch {
    pub hits: Vec<SearchHit>,
}

#[async_trait]
impl VectorSearch for FakeSearch {
    async fn search(&self, _embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

pub struct FakeDocuments {
    pub documents: Vec<Document>,
    pub fail: bool,
}

#[async_trait]
impl DocumentSource for FakeDocuments {
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Document>> {
        if self.fail {
            return Err(RagRunError::Custom("document store unavailable".to_string()));
        }
        // Reverse order: the controller must restore search order itself
        Ok(self
            .documents
            .iter()
            .rev()
            .filter(|doc| ids.contains(&doc.id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSynthesizer {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub panic: bool,
}

#[async_trait]
impl AnswerSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        context: &str,
        _params: GenerationParams,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        assert!(!self.panic, "synthesizer exploded");
        Ok(format!(
            "Answer to '{question}' from {} chars of context",
            context.chars().count()
        ))
    }
}

/// Records every update in publish order
#[derive(Default)]
pub struct RecordingSink {
    pub updates: Mutex<Vec<(String, RunUpdate)>>,
}

impl RecordingSink {
    pub fn for_run(&self, run_id: &str) -> Vec<RunUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn publish_update(&self, run_id: &str, update: RunUpdate) {
        self.updates
            .lock()
            .unwrap()
            .push((run_id.to_string(), update));
    }
}

pub fn document(id: &str, content: &str) -> Document {
    Document {
        id: id.to_string(),
        title: Some(format!("Doc {id}")),
        content: content.to_string(),
    }
}

pub fn hit(id: &str, score: f32) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        score,
    }
}

/// Handles to the fakes behind a controller
pub struct Harness {
    pub store: Arc<MemoryRunStore>,
    pub embedder: Arc<FakeEmbedder>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub sink: Arc<RecordingSink>,
    pub controller: Arc<PipelineController>,
}

pub struct HarnessBuilder {
    hits: Vec<SearchHit>,
    documents: Vec<Document>,
    fail_retrieval: bool,
    synthesizer: FakeSynthesizer,
    options: PipelineOptions,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            hits: vec![hit("d1", 0.92), hit("d2", 0.71)],
            documents: vec![
                document("d1", "Material risks must be disclosed."),
                document("d2", "Fees must be disclosed up front."),
            ],
            fail_retrieval: false,
            synthesizer: FakeSynthesizer::default(),
            options: PipelineOptions::default(),
            sink: None,
        }
    }
}

impl HarnessBuilder {
    pub fn hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn fail_retrieval(mut self) -> Self {
        self.fail_retrieval = true;
        self
    }

    pub fn synthesizer(mut self, synthesizer: FakeSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Publish to this sink instead of the recording one
    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryRunStore::new());
        let embedder = Arc::new(FakeEmbedder::default());
        let synthesizer = Arc::new(self.synthesizer);
        let recording = Arc::new(RecordingSink::default());

        let stages = StageSet {
            embedder: embedder.clone(),
            search: Arc::new(FakeSearch { hits: self.hits }),
            documents: Arc::new(FakeDocuments {
                documents: self.documents,
                fail: self.fail_retrieval,
            }),
            synthesizer: synthesizer.clone(),
        };

        let sink: Arc<dyn ProgressSink> = self
            .sink
            .unwrap_or_else(|| recording.clone() as Arc<dyn ProgressSink>);
        let controller = Arc::new(
            PipelineController::new(store.clone(), stages, self.options).with_notifier(sink),
        );

        Harness {
            store,
            embedder,
            synthesizer,
            sink: recording,
            controller,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn run(&self, id: &str) -> RunRecord {
        self.store.load_run(id).await.unwrap()
    }
}
