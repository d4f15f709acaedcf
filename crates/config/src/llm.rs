//! Channel and model configuration for the upstream LLM backends.

use std::{collections::BTreeMap, fmt};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Wire protocol family spoken by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat completions.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Ollama chat API with newline-delimited JSON streaming.
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured upstream endpoint with its credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Protocol family of the endpoint.
    #[serde(rename = "type")]
    pub kind: BackendKind,

    /// Base URL of the API. Each backend kind has its own default.
    #[serde(default)]
    pub server: Option<Url>,

    /// API key or token.
    #[serde(default)]
    pub secret: Option<SecretString>,

    /// Channel used when this one fails before producing output.
    #[serde(default)]
    pub backup: Option<String>,

    /// Free-form backend options, such as `max_context` or `thinking_budget`.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// One provider eligible to serve a model.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelProviderConfig {
    /// Provider identifier. Also names the channel unless `channel` overrides it.
    pub id: String,

    #[serde(rename = "type")]
    pub kind: BackendKind,

    /// Channel override.
    #[serde(default)]
    pub channel: Option<String>,

    /// Model identifier sent upstream instead of the requested one.
    #[serde(default)]
    pub rewrite: Option<String>,

    /// Higher values are tried first within the same capability group.
    #[serde(default)]
    pub priority: i32,

    /// Whether the provider produces extended reasoning output.
    #[serde(default)]
    pub reasoning: bool,
}

impl ModelProviderConfig {
    /// The channel this provider dispatches through.
    pub fn channel_id(&self) -> &str {
        self.channel.as_deref().unwrap_or(&self.id)
    }
}

/// Routing and prompt metadata for one model identifier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub providers: Vec<ModelProviderConfig>,

    /// Prompt merged into the leading system message of every request.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Temperature used when the request leaves it at zero.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Upper bound on input tokens, intersected with the backend's own limit.
    #[serde(default)]
    pub max_context: Option<usize>,

    /// Number of search results injected for retrieval augmentation.
    #[serde(default)]
    pub search_results: Option<usize>,

    /// Restricted models are only served to contexts that allow them.
    #[serde(default)]
    pub restricted: bool,
}
