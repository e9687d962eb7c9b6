//! LLM client used for answer synthesis
//!
//! Talks to either an OpenAI-compatible `/chat/completions` endpoint or an
//! Ollama `/api/generate` endpoint, chosen the same way as the embeddings
//! provider.

pub mod prompts;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

pub use prompts::PromptTemplate;
pub use prompts::RagPrompts;

use crate::config::AppConfig;
use crate::errors::RagRunError;
use crate::errors::Result;
use crate::pipeline::AnswerSynthesizer;
use crate::pipeline::GenerationParams;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    fn detect(endpoint: &str, key: &str) -> Self {
        if key == "ollama" || endpoint.contains("localhost") || endpoint.contains("127.0.0.1") {
            Self::Ollama
        } else {
            Self::OpenAI
        }
    }
}

/// One chat turn in an OpenAI-style request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Text generation service
pub struct LlmService {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let endpoint = config.llm_endpoint().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(RagRunError::ConfigError(
                "LLM endpoint is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| RagRunError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            provider: LlmProvider::detect(&endpoint, config.llm_key()),
            endpoint,
            api_key: config.llm_key().to_string(),
            model: config.llm_model().to_string(),
        })
    }

    #[must_use]
    pub const fn provider(&self) -> LlmProvider {
        self.provider
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion for a single prompt
    pub async fn generate_with_params(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String> {
        let text = match self.provider {
            LlmProvider::OpenAI => {
                self.chat_openai(&[ChatMessage::user(prompt)], temperature, max_tokens)
                    .await?
            }
            LlmProvider::Ollama => self.generate_ollama(prompt, temperature, max_tokens).await?,
        };
        Ok(text.trim().to_string())
    }

    async fn chat_openai(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: usize,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessage,
        }

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Calling OpenAI chat API: {} ({})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                temperature,
                max_tokens,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagRunError::LlmError(format!(
                "OpenAI API error ({status}): {error_text}"
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagRunError::LlmError(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagRunError::LlmError("No choices in response".to_string()))
    }

    async fn generate_ollama(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Serialize)]
        struct GenerateOptions {
            temperature: f32,
            num_predict: usize,
        }

        #[derive(Deserialize)]
        struct GenerateResponse {
            response: String,
        }

        let url = format!("{}/api/generate", self.endpoint);
        debug!("Calling Ollama generate API: {} ({})", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature,
                    num_predict: max_tokens,
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagRunError::LlmError(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagRunError::LlmError(format!("Failed to parse response: {e}")))?;

        Ok(result.response)
    }
}

#[async_trait]
impl AnswerSynthesizer for LlmService {
    async fn synthesize(
        &self,
        question: &str,
        context: &str,
        params: GenerationParams,
    ) -> Result<String> {
        let mut values = HashMap::new();
        values.insert("context".to_string(), context.to_string());
        values.insert("question".to_string(), question.to_string());
        let prompt = RagPrompts::context_qa().render(&values);

        self.generate_with_params(&prompt, params.temperature, params.max_tokens)
            .await
    }
}
