mod input;
mod output;

use std::sync::Arc;

use async_trait::async_trait;
use context::RequestContext;
use reqwest::{Client, header::CONTENT_TYPE};
use secrecy::ExposeSecret;

use self::{
    input::OpenAiRequest,
    output::{OpenAiDecoder, OpenAiResponse},
};

use super::{
    Backend, context_length,
    http_client::{http_client, read_body, send},
};
use crate::{
    catalog::Channel,
    error::LlmError,
    messages::{ChatRequest, ChatResponse, FinishReason},
    stream::{self, FragmentStream, framing::sse_frames},
    upload::Uploader,
};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Known context windows, most specific prefix first.
const CONTEXT_LENGTHS: &[(&str, usize)] = &[
    ("gpt-4.1", 1_047_576),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4", 200_000),
    ("deepseek", 64_000),
];

const DEFAULT_CONTEXT_LENGTH: usize = 8192;

/// OpenAI-compatible chat completions over SSE.
pub(super) struct OpenAiBackend {
    client: Client,
    base_url: String,
    channel: Channel,
    uploader: Option<Arc<dyn Uploader>>,
    stream_buffer: usize,
}

impl OpenAiBackend {
    pub fn new(channel: &Channel, uploader: Option<Arc<dyn Uploader>>, stream_buffer: usize) -> Self {
        let base_url = channel
            .server
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string());

        Self {
            client: http_client(),
            base_url,
            channel: channel.clone(),
            uploader,
            stream_buffer,
        }
    }

    async fn dispatch(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.clone();

        let body = OpenAiRequest::build(request, context.seed, self.uploader.as_ref()).await;

        let body = sonic_rs::to_vec(&body).map_err(|e| LlmError::InvalidRequest {
            provider: self.channel.id.clone(),
            message: format!("Failed to serialize request: {e}"),
        })?;

        log::debug!("Sending request for model '{model}' to '{}'", self.channel.id);

        let mut request = self.client.post(url).header(CONTENT_TYPE, "application/json").body(body);

        if let Some(secret) = &self.channel.secret {
            request = request.bearer_auth(secret.expose_secret());
        }

        send(&self.channel.id, request, context).await
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn chat(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        request.stream = false;

        let response = self.dispatch(request, context).await?;
        let body = read_body(&self.channel.id, response, context).await?;

        let response: OpenAiResponse = sonic_rs::from_str(&body).map_err(|e| {
            log::error!("Failed to parse chat completion from '{}': {e}", self.channel.id);
            LlmError::unavailable(&self.channel.id, format!("invalid response body: {e}"))
        })?;

        let response = ChatResponse::from(response);

        if response.finish_reason == FinishReason::ContentFilter && response.text.is_empty() {
            return Err(LlmError::ContentFiltered(format!(
                "'{}' withheld the response under its content policy",
                self.channel.id
            )));
        }

        Ok(response)
    }

    async fn chat_stream(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        request.stream = true;

        let response = self.dispatch(request, context).await?;
        let frames = sse_frames(response.bytes_stream(), self.channel.id.clone());

        let decoder = OpenAiDecoder {
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
