//! Chat-completion seam.
//!
//! `ChatClient` is the only way the pipeline talks to a model. `OpenAiClient`
//! is the HTTP implementation; tests use `crate::fakes::ScriptedChatClient`.

mod error;
mod openai;

pub use error::ClientError;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub seed: Option<u64>,
    pub max_tokens: u32,
    /// Ask the endpoint for a strict JSON object.
    pub json_mode: bool,
}

impl ChatRequest {
    /// Concatenated message contents, for cache keys and logs.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A chat-completion endpoint.
///
/// Every call spends tokens; callers must not call speculatively.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
}
