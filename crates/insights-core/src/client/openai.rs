//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatClient, ChatMessage, ChatRequest, ChatResponse, ClientError};
use crate::domain::TokenUsage;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("comment-insights/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn backend(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            seed: request.seed,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status.as_u16(), retry_after, &text));
        }

        let payload: WireResponse = response.json().await.map_err(|e| self.map_transport(e))?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Parse("response has no choices".to_string()))?;
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClientError::Parse("response message is empty".to_string()))?;

        debug!(
            model = %payload.model,
            finish_reason = ?choice.finish_reason,
            chars = content.len(),
            "completion received"
        );

        Ok(ChatResponse {
            content,
            usage: payload.usage.unwrap_or_default(),
            model: payload.model,
            finish_reason: choice.finish_reason,
        })
    }
}

impl OpenAiClient {
    fn map_transport(&self, err: reqwest::Error) -> ClientError {
        match ClientError::from(err) {
            ClientError::Timeout { .. } => ClientError::Timeout {
                after_secs: self.timeout.as_secs(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_request_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = WireRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.0,
            seed: Some(42),
            max_tokens: 3_520,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["seed"], 42);
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_wire_request_omits_missing_seed() {
        let body = WireRequest {
            model: "gpt-4o",
            messages: &[],
            temperature: 0.7,
            seed: None,
            max_tokens: 100,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("seed").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_wire_response_parses_usage() {
        let payload: WireResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        assert_eq!(payload.usage.unwrap().total_tokens, 15);
        assert_eq!(payload.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            OpenAiClient::new("https://api.example.com/v1/", "sk-test", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
