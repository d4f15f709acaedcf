mod input;
mod output;

use async_trait::async_trait;
use context::RequestContext;
use reqwest::{Client, header::CONTENT_TYPE};
use secrecy::ExposeSecret;

use self::{
    input::AnthropicRequest,
    output::{AnthropicDecoder, AnthropicResponse},
};

use super::{
    Backend, context_length,
    http_client::{http_client, read_body, send},
};
use crate::{
    catalog::Channel,
    error::LlmError,
    messages::{ChatRequest, ChatResponse},
    stream::{self, FragmentStream, framing::sse_frames},
};

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const CONTEXT_LENGTHS: &[(&str, usize)] = &[("claude-2.0", 100_000), ("claude-instant", 100_000), ("claude", 200_000)];
const DEFAULT_CONTEXT_LENGTH: usize = 200_000;

/// Anthropic messages API over SSE.
pub(super) struct AnthropicBackend {
    client: Client,
    base_url: String,
    channel: Channel,
    thinking_budget: Option<u32>,
    stream_buffer: usize,
}

impl AnthropicBackend {
    pub fn new(channel: &Channel, stream_buffer: usize) -> Self {
        let base_url = channel
            .server
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string());

        Self {
            client: http_client(),
            base_url,
            channel: channel.clone(),
            thinking_budget: channel.meta_value("thinking_budget"),
            stream_buffer,
        }
    }

    async fn dispatch(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<reqwest::Response> {
        let url = format!("{}/messages", self.base_url);
        let model = request.model.clone();

        let body = AnthropicRequest::build(request, self.thinking_budget);

        let body = sonic_rs::to_vec(&body).map_err(|e| LlmError::InvalidRequest {
            provider: self.channel.id.clone(),
            message: format!("Failed to serialize request: {e}"),
        })?;

        log::debug!("Sending request for model '{model}' to '{}'", self.channel.id);

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .body(body);

        if let Some(secret) = &self.channel.secret {
            request = request.header("x-api-key", secret.expose_secret());
        }

        send(&self.channel.id, request, context).await
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn chat(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        request.stream = false;

        let response = self.dispatch(request, context).await?;
        let body = read_body(&self.channel.id, response, context).await?;

        let response: AnthropicResponse = sonic_rs::from_str(&body).map_err(|e| {
            log::error!("Failed to parse Anthropic message from '{}': {e}", self.channel.id);
            LlmError::unavailable(&self.channel.id, format!("invalid response body: {e}"))
        })?;

        Ok(ChatResponse::from(response))
    }

    async fn chat_stream(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        request.stream = true;

        let response = self.dispatch(request, context).await?;
        let frames = sse_frames(response.bytes_stream(), self.channel.id.clone());

        let decoder = AnthropicDecoder {
            provider: self.channel.id.clone(),
        };

        Ok(stream::spawn(frames, decoder, &context.cancellation, self.stream_buffer))
    }

    fn max_context_length(&self, model: &str) -> usize {
        context_length(&self.channel, model, CONTEXT_LENGTHS, DEFAULT_CONTEXT_LENGTH)
    }

    fn name(&self) -> &str {
        &self.channel.id
    }
}
