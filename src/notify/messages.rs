//! JSON messages exchanged over the live notification channel

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::registry::ClientId;
use super::registry::ScopeKind;
use super::registry::SubscriptionScope;
use crate::models::timestamp_now;
use crate::models::RunResult;
use crate::models::RunStatus;
use crate::models::Stage;
use crate::pipeline::StageOutput;

/// Progress payload carried by `run_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUpdate {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl RunUpdate {
    #[must_use]
    pub const fn status(status: RunStatus) -> Self {
        Self {
            status,
            stage: None,
            result: None,
            error: None,
            elapsed_ms: None,
        }
    }

    #[must_use]
    pub fn stage_completed(output: &StageOutput, elapsed_ms: u64) -> Self {
        Self {
            stage: Some(output.stage()),
            result: serde_json::to_value(output).ok(),
            elapsed_ms: Some(elapsed_ms),
            ..Self::status(RunStatus::Running)
        }
    }

    #[must_use]
    pub fn stage_failed(stage: Stage, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage: Some(stage),
            error: Some(error.into()),
            elapsed_ms: Some(elapsed_ms),
            ..Self::status(RunStatus::Running)
        }
    }

    #[must_use]
    pub fn completed(result: &RunResult) -> Self {
        Self {
            result: serde_json::to_value(result).ok(),
            elapsed_ms: Some(result.total_ms),
            ..Self::status(RunStatus::Completed)
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>, elapsed_ms: Option<u64>) -> Self {
        Self {
            error: Some(error.into()),
            elapsed_ms,
            ..Self::status(RunStatus::Failed)
        }
    }
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Connected {
        client_id: ClientId,
        timestamp: String,
    },
    Subscribed {
        run_id: String,
        scope: ScopeKind,
        timestamp: String,
    },
    Unsubscribed {
        run_id: String,
        scope: ScopeKind,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    RunUpdate {
        run_id: String,
        update: RunUpdate,
        timestamp: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    #[must_use]
    pub fn connected(client_id: ClientId) -> Self {
        Self::Connected {
            client_id,
            timestamp: timestamp_now(),
        }
    }

    #[must_use]
    pub fn subscribed(scope: &SubscriptionScope) -> Self {
        Self::Subscribed {
            run_id: scope.run_id().to_string(),
            scope: scope.kind(),
            timestamp: timestamp_now(),
        }
    }

    #[must_use]
    pub fn unsubscribed(scope: &SubscriptionScope) -> Self {
        Self::Unsubscribed {
            run_id: scope.run_id().to_string(),
            scope: scope.kind(),
            timestamp: timestamp_now(),
        }
    }

    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: timestamp_now(),
        }
    }

    #[must_use]
    pub fn run_update(run_id: impl Into<String>, update: RunUpdate) -> Self {
        Self::RunUpdate {
            run_id: run_id.into(),
            update,
            timestamp: timestamp_now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        run_id: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        run_id: Option<String>,
    },
    Ping,
}

const CLIENT_MESSAGE_TYPES: [&str; 3] = ["subscribe", "unsubscribe", "ping"];

/// Parse an inbound text frame; the error string is sent back as-is
pub fn parse_client_message(text: &str) -> std::result::Result<ClientMessage, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| "Invalid JSON message".to_string())?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => return Err(format!("Unknown message type: {other}")),
        None => return Err("Missing message type".to_string()),
    };
    if !CLIENT_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(format!("Unknown message type: {kind}"));
    }

    serde_json::from_value(value).map_err(|e| format!("Invalid {kind} message: {e}"))
}

/// Receiver of run progress; delivery is best effort and never reports back
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish_update(&self, run_id: &str, update: RunUpdate);
}
