//! The capability contract every upstream adapter implements.

mod anthropic;
pub mod failover;
mod http_client;
mod ollama;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use config::BackendKind;
use context::RequestContext;

use crate::{
    catalog::Channel,
    messages::{ChatRequest, ChatResponse},
    stream::FragmentStream,
    upload::Uploader,
};

pub use failover::Failover;

/// A vendor-specific client bound to one channel.
///
/// Adapters translate the canonical request into their own wire format and map
/// the vendor's error envelope onto [`crate::LlmError`]. They are stateless per
/// request beyond their credentials and transport.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Sends a request and waits for the complete response.
    async fn chat(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse>;

    /// Sends a request and returns the live response once the upstream accepted it.
    ///
    /// Errors before the stream handle exists are returned directly. Errors after
    /// that arrive as the last stream item.
    async fn chat_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream>;

    /// Input token limit of `model` on this backend.
    fn max_context_length(&self, model: &str) -> usize;

    /// Name used in logs and errors, usually the channel id.
    fn name(&self) -> &str;
}

/// Creates adapters for channels.
pub trait BackendBuilder: Send + Sync {
    fn build(&self, channel: &Channel) -> crate::Result<Arc<dyn Backend>>;
}

/// Builds the HTTP adapters shipped with this crate.
#[derive(Clone, Default)]
pub struct BackendFactory {
    uploader: Option<Arc<dyn Uploader>>,
    stream_buffer: usize,
}

impl BackendFactory {
    pub fn new(stream_buffer: usize) -> Self {
        Self {
            uploader: None,
            stream_buffer,
        }
    }

    /// Uploader used by adapters that need inline images as URLs.
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }
}

impl BackendBuilder for BackendFactory {
    fn build(&self, channel: &Channel) -> crate::Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match channel.kind {
            BackendKind::OpenAi => Arc::new(openai::OpenAiBackend::new(
                channel,
                self.uploader.clone(),
                self.stream_buffer,
            )),
            BackendKind::Anthropic => Arc::new(anthropic::AnthropicBackend::new(channel, self.stream_buffer)),
            BackendKind::Ollama => Arc::new(ollama::OllamaBackend::new(channel, self.stream_buffer)),
        };

        log::debug!("Built {} backend for channel '{}'", channel.kind, channel.id);

        Ok(backend)
    }
}

/// Context limit from the channel `max_context` meta value, or the first matching
/// model prefix in `table`, or `default`.
pub(crate) fn context_length(channel: &Channel, model: &str, table: &[(&str, usize)], default: usize) -> usize {
    if let Some(max) = channel.meta_value::<usize>("max_context") {
        return max;
    }

    table
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, length)| *length)
        .unwrap_or(default)
}
