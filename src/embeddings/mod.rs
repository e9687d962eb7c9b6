//! Embeddings generation module
//!
//! Turns question text into a vector using one of:
//! - OpenAI-compatible `/embeddings` endpoints
//! - Ollama (local models)
//!
//! # Examples
//!
//! ```rust,no_run
//! use ragrun::embeddings::EmbeddingClient;
//! use ragrun::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let client = EmbeddingClient::from_app_config(&config)?;
//!
//!     let embedding = client.generate("What must I disclose?").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;

use crate::errors::RagRunError;
use crate::errors::Result;

/// Configuration for embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl EmbeddingConfig {
    pub fn from_app_config(config: &crate::config::AppConfig) -> Self {
        let endpoint = config.embedding_endpoint();
        // Priority: llm_key > endpoint domain
        let provider = if config.llm_key() == "ollama" {
            EmbeddingProvider::Ollama
        } else if endpoint.contains("localhost") || endpoint.contains("127.0.0.1") {
            EmbeddingProvider::Ollama
        } else {
            EmbeddingProvider::OpenAI
        };

        Self {
            provider,
            model: config.embedding_model().to_string(),
            dimension: config.embedding_dimension(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: if provider == EmbeddingProvider::OpenAI {
                Some(config.llm_key().to_string())
            } else {
                None
            },
        }
    }
}

/// Collapse whitespace and strip control characters before embedding
pub fn preprocess_text_for_embedding(text: &str) -> Result<String> {
    let cleaned = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        return Err(RagRunError::EmbeddingError(
            "Text is empty after preprocessing".to_string(),
        ));
    }
    Ok(cleaned)
}
