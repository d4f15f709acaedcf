use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::{
    messages::{ChatRequest, ContentPart, ImageSource, Message},
    upload::Uploader,
};

/// Request body of the chat completions endpoint.
#[derive(Debug, Serialize)]
pub(super) struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(super) struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct OpenAiMessage {
    pub role: &'static str,
    pub content: OpenAiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum OpenAiPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub(super) struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'static str>,
}

impl OpenAiRequest {
    /// Translates a canonical request. Inline images are uploaded when an uploader
    /// is available and sent as data URLs otherwise.
    pub async fn build(
        request: ChatRequest,
        seed: Option<u64>,
        uploader: Option<&Arc<dyn Uploader>>,
    ) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in request.messages {
            messages.push(OpenAiMessage::build(message, uploader).await);
        }

        Self {
            model: request.model,
            messages,
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions { include_usage: true }),
            max_tokens: (request.max_tokens > 0).then_some(request.max_tokens),
            temperature: (request.temperature > 0.0).then_some(request.temperature),
            seed,
        }
    }
}

impl OpenAiMessage {
    async fn build(message: Message, uploader: Option<&Arc<dyn Uploader>>) -> Self {
        let role = message.role.as_str();

        if !message.is_multipart() {
            return Self {
                role,
                content: OpenAiContent::Text(message.text),
            };
        }

        let mut parts = Vec::with_capacity(message.parts.len());

        for part in message.parts {
            let part = match part {
                ContentPart::Text { text } => OpenAiPart::Text { text },
                ContentPart::Image { source, detail } => OpenAiPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url(source, uploader).await,
                        detail: detail.map(|d| d.as_str()),
                    },
                },
                ContentPart::File { url, name } => OpenAiPart::Text {
                    text: match name {
                        Some(name) => format!("[{name}]({url})"),
                        None => url,
                    },
                },
            };

            parts.push(part);
        }

        Self {
            role,
            content: OpenAiContent::Parts(parts),
        }
    }
}

async fn image_url(source: ImageSource, uploader: Option<&Arc<dyn Uploader>>) -> String {
    let (Some(uploader), ImageSource::Base64 { media_type, data }) = (uploader, &source) else {
        return source.to_url();
    };

    let extension = media_type.rsplit('/').next().unwrap_or("png");

    let bytes = match STANDARD.decode(data) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Inline image is not valid base64, sending it as a data URL: {e}");
            return source.to_url();
        }
    };

    match uploader.store(bytes, extension).await {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Failed to upload inline image, sending it as a data URL: {e:#}");
            source.to_url()
        }
    }
}
