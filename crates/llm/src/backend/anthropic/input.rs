use serde::Serialize;

use crate::messages::{ChatRequest, ContentPart, ImageSource, Message, Role};

/// Used when the request leaves `max_tokens` to the backend, which Anthropic does not allow.
pub(super) const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request body of the messages endpoint.
#[derive(Debug, Serialize)]
pub(super) struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Thinking>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum Thinking {
    Enabled { budget_tokens: u32 },
}

#[derive(Debug, Serialize)]
pub(super) struct AnthropicMessage {
    pub role: &'static str,
    pub content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

impl AnthropicRequest {
    /// Translates a canonical request. System messages move to the `system` field.
    ///
    /// A thinking budget enables extended thinking, which needs room for the answer
    /// on top of the budget and does not accept a temperature.
    pub fn build(request: ChatRequest, thinking_budget: Option<u32>) -> Self {
        let (system, turns): (Vec<_>, Vec<_>) = request.messages.into_iter().partition(|m| m.role == Role::System);

        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(Message::plain_text)
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        let mut max_tokens = match request.max_tokens {
            0 => DEFAULT_MAX_TOKENS,
            max => max,
        };

        let mut temperature = (request.temperature > 0.0).then_some(request.temperature);

        let thinking = thinking_budget.map(|budget_tokens| {
            max_tokens = max_tokens.max(budget_tokens + DEFAULT_MAX_TOKENS);
            temperature = None;

            Thinking::Enabled { budget_tokens }
        });

        Self {
            model: request.model,
            max_tokens,
            system,
            messages: turns.into_iter().map(AnthropicMessage::from).collect(),
            stream: request.stream,
            temperature,
            thinking,
        }
    }
}

impl From<Message> for AnthropicMessage {
    fn from(message: Message) -> Self {
        let role = message.role.as_str();

        if !message.is_multipart() {
            return Self {
                role,
                content: AnthropicContent::Text(message.text),
            };
        }

        let blocks = message
            .parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text { text } => AnthropicBlock::Text { text },
                ContentPart::Image {
                    source: ImageSource::Base64 { media_type, data },
                    ..
                } => AnthropicBlock::Image {
                    source: AnthropicImageSource::Base64 { media_type, data },
                },
                ContentPart::Image {
                    source: ImageSource::Url { url },
                    ..
                } => AnthropicBlock::Image {
                    source: AnthropicImageSource::Url { url },
                },
                ContentPart::File { url, name } => AnthropicBlock::Text {
                    text: match name {
                        Some(name) => format!("[{name}]({url})"),
                        None => url,
                    },
                },
            })
            .collect();

        Self {
            role,
            content: AnthropicContent::Blocks(blocks),
        }
    }
}
