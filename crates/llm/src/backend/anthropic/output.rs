use serde::Deserialize;

use crate::{
    error::LlmError,
    messages::{ChatResponse, FinishReason, ResponseFragment},
    stream::{Decoded, EventDecoder},
};

/// Response from the messages API.
#[derive(Debug, Deserialize)]
pub(super) struct AnthropicResponse {
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

/// A content block of a response. Block types we do not consume are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
}

impl From<AnthropicResponse> for ChatResponse {
    fn from(response: AnthropicResponse) -> Self {
        let mut text = String::new();
        let mut reasoning_text = String::new();

        for block in response.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::Thinking { thinking } => reasoning_text.push_str(&thinking),
                AnthropicContentBlock::Other => {}
            }
        }

        ChatResponse {
            text,
            finish_reason: response
                .stop_reason
                .as_deref()
                .map(FinishReason::from_vendor)
                .unwrap_or_default(),
            input_tokens: response.usage.input_tokens.unwrap_or_default(),
            output_tokens: response.usage.output_tokens.unwrap_or_default(),
            reasoning_text,
        }
    }
}

/// Typed server-sent events of a streaming response.
///
/// Event order: `message_start`, then for each content block `content_block_start`,
/// any number of `content_block_delta` and `content_block_stop`, then
/// `message_delta` and `message_stop`. `ping` and `error` may appear anywhere.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicMessageStart,
    },
    ContentBlockDelta {
        delta: AnthropicBlockDelta,
    },
    MessageDelta {
        delta: AnthropicMessageDeltaData,
        #[serde(default)]
        usage: AnthropicUsage,
    },
    MessageStop,
    Error {
        error: AnthropicStreamError,
    },
    /// `ping`, `content_block_start`, `content_block_stop` and future events.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnthropicMessageStart {
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicBlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    /// Signatures and tool input, which are not surfaced.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnthropicMessageDeltaData {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnthropicStreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl AnthropicStreamError {
    pub fn into_error(self, provider: &str) -> LlmError {
        match self.error_type.as_str() {
            "overloaded_error" | "rate_limit_error" | "api_error" | "authentication_error" | "permission_error" => {
                LlmError::unavailable(provider, format!("{}: {}", self.error_type, self.message))
            }
            _ => LlmError::InvalidRequest {
                provider: provider.to_string(),
                message: format!("{}: {}", self.error_type, self.message),
            },
        }
    }
}

pub(super) struct AnthropicDecoder {
    pub provider: String,
}

impl EventDecoder for AnthropicDecoder {
    fn decode(&mut self, frame: &str) -> crate::Result<Decoded> {
        let event: AnthropicStreamEvent = sonic_rs::from_str(frame).map_err(|e| {
            log::debug!("Unparsable event from '{}': {frame}", self.provider);
            LlmError::StreamDecodeError(format!("invalid event from '{}': {e}", self.provider))
        })?;

        let fragment = match event {
            AnthropicStreamEvent::MessageStart { message } => ResponseFragment {
                input_tokens: message.usage.input_tokens,
                ..Default::default()
            },
            AnthropicStreamEvent::ContentBlockDelta { delta } => match delta {
                AnthropicBlockDelta::TextDelta { text } => ResponseFragment::text(text),
                AnthropicBlockDelta::ThinkingDelta { thinking } => ResponseFragment::reasoning(thinking),
                AnthropicBlockDelta::Other => return Ok(Decoded::Skip),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => ResponseFragment {
                finish_reason: delta.stop_reason.as_deref().map(FinishReason::from_vendor),
                output_tokens: usage.output_tokens,
                ..Default::default()
            },
            AnthropicStreamEvent::MessageStop => return Ok(Decoded::Done),
            AnthropicStreamEvent::Error { error } => return Err(error.into_error(&self.provider)),
            AnthropicStreamEvent::Other => return Ok(Decoded::Skip),
        };

        if fragment.is_empty() {
            return Ok(Decoded::Skip);
        }

        Ok(Decoded::Fragment(fragment))
    }
}
