use std::time::Duration;

use serde::Deserialize;

use crate::BackendKind;

/// Limits and timeouts applied to every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of question/answer exchanges kept before the last user turn.
    pub max_turns: usize,

    /// Caller-side budget for input tokens, intersected with the model limits.
    pub max_input_tokens: usize,

    /// Hard ceiling for the last message of a conversation.
    pub max_message_tokens: usize,

    /// Upper bound for a retrieval augmentation search.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub search_timeout: Duration,

    /// Search results injected when neither request nor model specify a count.
    pub search_results: usize,

    /// Capacity of the per-stream fragment queue.
    pub stream_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_input_tokens: 128_000,
            max_message_tokens: 7000,
            search_timeout: Duration::from_secs(30),
            search_results: 3,
            stream_buffer: 32,
        }
    }
}

/// Provider used for model identifiers that have no configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Provider identifier, which is also the channel it dispatches through.
    pub provider: String,

    #[serde(rename = "type")]
    pub kind: BackendKind,

    /// Deliberately small context limit for unknown models.
    pub max_context: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            kind: BackendKind::OpenAi,
            max_context: 4000,
        }
    }
}
