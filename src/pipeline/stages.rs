//! Stage capabilities and their typed outputs
//!
//! Each stage of a run is backed by an external capability. The controller
//! only sees these traits; the HTTP clients and the database implement them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::Result;
use crate::models::Stage;

/// A nearest-neighbour hit from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// A document body fetched by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
}

/// A fetched document together with the score of the hit that selected it
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document: Document,
    pub score: f32,
}

/// Sampling parameters passed to the synthesis capability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Representation generation
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Similarity search over the vector index
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

/// Content retrieval by document id; unknown ids are skipped
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Document>>;
}

/// Answer synthesis from a question and an assembled context
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        question: &str,
        context: &str,
        params: GenerationParams,
    ) -> Result<String>;
}

/// The four capabilities a run needs, in execution order
#[derive(Clone)]
pub struct StageSet {
    pub embedder: Arc<dyn Embedder>,
    pub search: Arc<dyn VectorSearch>,
    pub documents: Arc<dyn DocumentSource>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
}

/// What a finished stage produced, as reported to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StageOutput {
    Embedding {
        dimensions: usize,
    },
    Search {
        hits: usize,
        top_score: Option<f32>,
    },
    Retrieval {
        documents: usize,
        context_chars: usize,
    },
    Synthesis {
        answer_chars: usize,
        insufficient_context: bool,
    },
}

impl StageOutput {
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Embedding { .. } => Stage::Embedding,
            Self::Search { .. } => Stage::Search,
            Self::Retrieval { .. } => Stage::Retrieval,
            Self::Synthesis { .. } => Stage::Synthesis,
        }
    }

    /// One-line description for progress notes and traces
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Embedding { dimensions } => format!("{dimensions} dimensions"),
            Self::Search { hits, top_score } => match top_score {
                Some(score) => format!("{hits} hits, top score {score:.3}"),
                None => format!("{hits} hits"),
            },
            Self::Retrieval {
                documents,
                context_chars,
            } => format!("{documents} documents, {context_chars} context chars"),
            Self::Synthesis {
                answer_chars,
                insufficient_context,
            } => {
                if *insufficient_context {
                    format!("{answer_chars} chars (no context)")
                } else {
                    format!("{answer_chars} chars")
                }
            }
        }
    }
}
