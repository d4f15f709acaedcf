use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use context::RequestContext;
use reqwest::{Client, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{
    Backend, context_length,
    http_client::{http_client, read_body, send},
};
use crate::{
    catalog::Channel,
    error::LlmError,
    messages::{ChatRequest, ChatResponse, ContentPart, FinishReason, ImageSource, Message, ResponseFragment},
    stream::{self, Decoded, EventDecoder, FragmentStream, framing::ndjson_frames},
};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_CONTEXT_LENGTH: usize = 8192;

/// A local or self-hosted Ollama server, streaming newline-delimited JSON.
pub(super) struct OllamaBackend {
    client: Client,
    base_url: String,
    channel: Channel,
    /// Asks thinking models for their reasoning trace.
    think: bool,
    stream_buffer: usize,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    think: bool,
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    /// Base64 encoded images without a data URL prefix.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Both the complete response and every line of a stream.
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

impl OllamaChunk {
    fn into_fragment(self) -> ResponseFragment {
        let message = self.message.unwrap_or_default();

        ResponseFragment {
            text_delta: message.content,
            reasoning_delta: message.thinking.unwrap_or_default(),
            finish_reason: self
                .done
                .then(|| self.done_reason.as_deref().map(FinishReason::from_vendor).unwrap_or_default()),
            input_tokens: self.prompt_eval_count,
            output_tokens: self.eval_count,
        }
    }
}

impl From<OllamaChunk> for ChatResponse {
    fn from(chunk: OllamaChunk) -> Self {
        let fragment = chunk.into_fragment();

        ChatResponse {
            text: fragment.text_delta,
            finish_reason: fragment.finish_reason.unwrap_or_default(),
            input_tokens: fragment.input_tokens.unwrap_or_default(),
            output_tokens: fragment.output_tokens.unwrap_or_default(),
            reasoning_text: fragment.reasoning_delta,
        }
    }
}

struct OllamaDecoder {
    provider: String,
    finished: bool,
}

impl EventDecoder for OllamaDecoder {
    fn decode(&mut self, frame: &str) -> crate::Result<Decoded> {
        if self.finished {
            return Ok(Decoded::Done);
        }

        let chunk: OllamaChunk = sonic_rs::from_str(frame).map_err(|e| {
            log::debug!("Unparsable line from '{}': {frame}", self.provider);
            LlmError::StreamDecodeError(format!("invalid line from '{}': {e}", self.provider))
        })?;

        if let Some(error) = chunk.error {
            return Err(LlmError::unavailable(&self.provider, error));
        }

        self.finished = chunk.done;

        let fragment = chunk.into_fragment();

        if fragment.is_empty() {
            return Ok(Decoded::Skip);
        }

        Ok(Decoded::Fragment(fragment))
    }
}

impl OllamaBackend {
    pub fn new(channel: &Channel, stream_buffer: usize) -> Self {
        let base_url = channel
            .server
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self {
            client: http_client(),
            base_url,
            channel: channel.clone(),
            think: channel.meta_value("think").unwrap_or_default(),
            stream_buffer,
        }
    }

    async fn build_request(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<OllamaRequest> {
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in request.messages {
            messages.push(self.build_message(message, context).await?);
        }

        Ok(OllamaRequest {
            model: request.model,
            messages,
            stream: request.stream,
            think: self.think,
            options: OllamaOptions {
                temperature: (request.temperature > 0.0).then_some(request.temperature),
                num_predict: (request.max_tokens > 0).then_some(request.max_tokens),
                num_ctx: self.channel.meta_value("num_ctx"),
                seed: context.seed,
            },
        })
    }

    async fn build_message(&self, message: Message, context: &RequestContext) -> crate::Result<OllamaMessage> {
        let role = message.role.as_str();

        if !message.is_multipart() {
            return Ok(OllamaMessage {
                role,
                content: message.text,
                images: Vec::new(),
            });
        }

        let mut content = Vec::new();
        let mut images = Vec::new();

        for part in message.parts {
            match part {
                ContentPart::Text { text } => content.push(text),
                ContentPart::File { url, name } => content.push(match name {
                    Some(name) => format!("[{name}]({url})"),
                    None => url,
                }),
                ContentPart::Image {
                    source: ImageSource::Base64 { data, .. },
                    ..
                } => images.push(data),
                ContentPart::Image {
                    source: ImageSource::Url { url },
                    ..
                } => match self.fetch_image(&url, context).await {
                    Ok(data) => images.push(data),
                    Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                    Err(e) => log::warn!("Skipping image '{url}' for '{}': {e}", self.channel.id),
                },
            }
        }

        Ok(OllamaMessage {
            role,
            content: content.join("\n"),
            images,
        })
    }

    /// Ollama only accepts inline images.
    async fn fetch_image(&self, url: &str, context: &RequestContext) -> crate::Result<String> {
        let response = send(&self.channel.id, self.client.get(url), context).await?;

        let bytes = tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => return Err(LlmError::Cancelled),
            bytes = response.bytes() => bytes,
        };

        let bytes = bytes.map_err(|e| LlmError::unavailable(&self.channel.id, format!("failed to read image: {e}")))?;

        Ok(STANDARD.encode(bytes))
    }

    async fn dispatch(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let model = request.model.clone();

        let body = self.build_request(request, context).await?;

        let body = sonic_rs::to_vec(&body).map_err(|e| LlmError::InvalidRequest {
            provider: self.channel.id.clone(),
            message: format!("Failed to serialize request: {e}"),
        })?;

        log::debug!("Sending request for model '{model}' to '{}'", self.channel.id);

        let request = self.client.post(url).header(CONTENT_TYPE, "application/json").body(body);

        send(&self.channel.id, request, context).await
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn chat(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        request.stream = false;

        let response = self.dispatch(request, context).await?;
        let body = read_body(&self.channel.id, response, context).await?;

        let chunk: OllamaChunk = sonic_rs::from_str(&body).map_err(|e| {
            log::error!("Failed to parse chat response from '{}': {e}", self.channel.id);
            LlmError::unavailable(&self.channel.id, format!("invalid response body: {e}"))
        })?;

        if let Some(error) = chunk.error {
            return Err(LlmError::unavailable(&self.channel.id, error));
        }

        Ok(ChatResponse::from(chunk))
    }

    async fn chat_stream(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        request.stream = true;

        let response = self.dispatch(request, context).await?;
        let frames = ndjson_frames(response.bytes_stream(), self.channel.id.clone());

        let decoder = OllamaDecoder {
            provider: self.channel.id.clone(),
            finished: false,
        };

        Ok(stream::spawn(frames, decoder, &context.cancellation, self.stream_buffer))
    }

    fn max_context_length(&self, model: &str) -> usize {
        context_length(&self.channel, model, &[], DEFAULT_CONTEXT_LENGTH)
    }

    fn name(&self) -> &str {
        &self.channel.id
    }
}
