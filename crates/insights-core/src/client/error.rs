//! Failures of a chat-completion call, tagged so retry logic can branch on the
//! variant instead of the message.

/// Errors from [`super::ChatClient::complete`] and response parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("request rejected ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("malformed response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Map a non-success HTTP status to a variant.
    pub fn from_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> Self {
        let message = truncate_message(body);
        match status {
            401 | 403 => ClientError::Auth { status, message },
            429 => ClientError::RateLimited { retry_after_secs },
            408 => ClientError::Timeout { after_secs: 0 },
            500..=599 => ClientError::Server { status, message },
            _ => ClientError::InvalidRequest { status, message },
        }
    }

    /// Transient failures that a later identical call may not reproduce.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::Timeout { .. }
                | ClientError::RateLimited { .. }
                | ClientError::Server { .. }
        )
    }

    /// Failures that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Auth { .. } | ClientError::InvalidRequest { .. })
    }

    /// Short stable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "transport",
            ClientError::Timeout { .. } => "timeout",
            ClientError::RateLimited { .. } => "rate_limited",
            ClientError::Server { .. } => "server",
            ClientError::Auth { .. } => "auth",
            ClientError::InvalidRequest { .. } => "invalid_request",
            ClientError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout { after_secs: 0 }
        } else if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

fn truncate_message(body: &str) -> String {
    const MAX: usize = 300;
    let body = body.trim();
    if body.chars().count() <= MAX {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX).collect();
    out.push('…');
    out
}
