//! In-memory stand-ins for the chat endpoint (testing only).
//!
//! `ScriptedChatClient` answers every request through a closure and records
//! what it was asked, so tests can drive the pipeline without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::client::{ChatClient, ChatRequest, ChatResponse, ClientError, Role};
use crate::domain::TokenUsage;

type Handler = dyn Fn(&ChatRequest, usize) -> Result<ChatResponse, ClientError> + Send + Sync;

/// Chat client whose replies come from a closure `(request, call_number)`.
pub struct ScriptedChatClient {
    handler: Box<Handler>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl std::fmt::Debug for ScriptedChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedChatClient")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl ScriptedChatClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<ChatResponse, ClientError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every comment in every batch gets the same sentiment and confidence.
    pub fn uniform(sentiment: &'static str, confidence: f64) -> Self {
        Self::new(move |request, _| {
            let n = numbered_comments(request).len();
            let entries = vec![(sentiment, confidence); n];
            Ok(chat_response(response_json(&entries)))
        })
    }

    /// Replies in order; the last entry repeats once the script runs out.
    pub fn sequence(replies: Vec<Result<ChatResponse, ClientError>>) -> Self {
        Self::new(move |_, call| {
            let idx = call.min(replies.len().saturating_sub(1));
            replies
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Err(ClientError::Transport("empty script".to_string())))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    fn backend(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        (self.handler)(request, call)
    }
}

/// Comment texts of a request, in prompt order (`"1. text"` lines of the user message).
pub fn numbered_comments(request: &ChatRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .flat_map(|m| m.content.lines())
        .filter_map(|line| {
            let (number, text) = line.split_once(". ")?;
            number.parse::<usize>().ok()?;
            Some(text.to_string())
        })
        .collect()
}

/// Model reply with one `(sentiment, confidence)` entry per comment.
pub fn response_json(entries: &[(&str, f64)]) -> String {
    let comments: Vec<_> = entries
        .iter()
        .enumerate()
        .map(|(i, (sentiment, confidence))| {
            json!({
                "index": i + 1,
                "sentiment": sentiment,
                "confidence": confidence,
                "emotions": [],
                "themes": [{"category": "service", "relevance": 0.8}],
                "pain_points": [],
                "urgency": "low",
            })
        })
        .collect();
    json!({
        "summary": {"overall_trend": "neutral", "confidence": 0.8, "key_themes": ["service"]},
        "comments": comments,
    })
    .to_string()
}

pub fn chat_response(content: impl Into<String>) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        usage: TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        },
        model: "scripted".to_string(),
        finish_reason: Some("stop".to_string()),
    }
}
