use reqwest::StatusCode;
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors produced anywhere between normalization and the last stream fragment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    /// Malformed input to normalization. Never retried.
    #[error("Invalid conversation state: {0}")]
    InvalidState(String),

    /// The tokenizer for a model family could not be loaded.
    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),

    /// The conversation does not fit the context window, even with a single message left.
    #[error("Context too large: {0}")]
    ContextTooLarge(String),

    /// The last message alone exceeds the per-message ceiling.
    #[error("Message too long: {tokens} tokens exceeds the limit of {limit}")]
    MessageTooLong { tokens: usize, limit: usize },

    /// The backend rejected the content under its content policy.
    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    /// Transport, authentication, rate limit or server failure. Triggers failover.
    #[error("Backend '{provider}' unavailable: {message}")]
    BackendUnavailable { provider: String, message: String },

    /// The backend refused the request parameters.
    #[error("Backend '{provider}' rejected the request: {message}")]
    InvalidRequest { provider: String, message: String },

    /// An upstream frame could not be decoded.
    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    /// Retrieval augmentation failed. Recovered locally.
    #[error("Search failed: {0}")]
    SearchFailed(String),

    /// The model is restricted and the request context does not allow it.
    #[error("Model '{0}' is restricted")]
    ModelRestricted(String),

    /// The request was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "invalid_state",
            Self::TokenizationFailed(_) => "tokenization_failed",
            Self::ContextTooLarge(_) => "context_too_large",
            Self::MessageTooLong { .. } => "message_too_long",
            Self::ContentFiltered(_) => "content_filtered",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::StreamDecodeError(_) => "stream_decode_error",
            Self::SearchFailed(_) => "search_failed",
            Self::ModelRestricted(_) => "model_restricted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Errors the caller can fix by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::ContextTooLarge(_) | Self::MessageTooLong { .. } | Self::ContentFiltered(_) | Self::ModelRestricted(_)
        )
    }

    pub(crate) fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Maps a non-success upstream HTTP status and its body onto the error taxonomy.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: String) -> LlmError {
    log::debug!("Backend '{provider}' returned {status}: {body}");

    match status.as_u16() {
        400 | 413 if mentions_context_length(&body) => LlmError::ContextTooLarge(body),
        400 if mentions_content_policy(&body) => LlmError::ContentFiltered(body),
        401 | 403 | 404 | 408 | 429 | 500..=599 => LlmError::unavailable(provider, format!("{status}: {body}")),
        _ => LlmError::InvalidRequest {
            provider: provider.to_string(),
            message: format!("{status}: {body}"),
        },
    }
}

fn mentions_context_length(body: &str) -> bool {
    let body = body.to_ascii_lowercase();

    ["context_length_exceeded", "context length", "prompt is too long", "too many tokens"]
        .iter()
        .any(|needle| body.contains(needle))
}

fn mentions_content_policy(body: &str) -> bool {
    let body = body.to_ascii_lowercase();

    ["content_filter", "content_policy", "content policy", "content management policy"]
        .iter()
        .any(|needle| body.contains(needle))
}
