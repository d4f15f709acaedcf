use serde::Deserialize;

use crate::{
    error::LlmError,
    messages::{ChatResponse, FinishReason, ResponseFragment},
    stream::{Decoded, EventDecoder},
};

/// Response body of a non-streaming chat completion.
#[derive(Debug, Deserialize)]
pub(super) struct OpenAiResponse {
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiResponseMessage {
    pub content: Option<String>,
    /// Extended reasoning output of reasoning models served through compatible APIs.
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl From<OpenAiResponse> for ChatResponse {
    fn from(response: OpenAiResponse) -> Self {
        let choice = response.choices.into_iter().next();
        let usage = response.usage;

        let (text, reasoning_text, finish_reason) = match choice {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice.message.reasoning_content.unwrap_or_default(),
                choice.finish_reason.as_deref().map(FinishReason::from_vendor).unwrap_or_default(),
            ),
            None => (String::new(), String::new(), FinishReason::default()),
        };

        ChatResponse {
            text,
            finish_reason,
            input_tokens: usage.as_ref().map(|u| u.prompt_tokens).unwrap_or_default(),
            output_tokens: usage.as_ref().map(|u| u.completion_tokens).unwrap_or_default(),
            reasoning_text,
        }
    }
}

/// One `data:` payload of a streaming chat completion.
#[derive(Debug, Deserialize)]
pub(super) struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiChoiceDelta>,
    pub usage: Option<OpenAiUsage>,
    /// Some compatible servers report failures inside the stream.
    pub error: Option<OpenAiStreamError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiChoiceDelta {
    #[serde(default)]
    pub delta: OpenAiDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct OpenAiDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiStreamError {
    pub message: String,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

pub(super) struct OpenAiDecoder {
    pub provider: String,
}

impl EventDecoder for OpenAiDecoder {
    fn decode(&mut self, frame: &str) -> crate::Result<Decoded> {
        if frame.trim() == "[DONE]" {
            return Ok(Decoded::Done);
        }

        let chunk: OpenAiStreamChunk = sonic_rs::from_str(frame).map_err(|e| {
            log::debug!("Unparsable chunk from '{}': {frame}", self.provider);
            LlmError::StreamDecodeError(format!("invalid chunk from '{}': {e}", self.provider))
        })?;

        if let Some(error) = chunk.error {
            let code = error.code.map(|code| code.to_string()).unwrap_or_default();

            return Err(if code.contains("content_filter") {
                LlmError::ContentFiltered(error.message)
            } else {
                LlmError::unavailable(&self.provider, error.message)
            });
        }

        let mut fragment = ResponseFragment::default();

        if let Some(choice) = chunk.choices.into_iter().next() {
            fragment.text_delta = choice.delta.content.unwrap_or_default();
            fragment.reasoning_delta = choice.delta.reasoning_content.unwrap_or_default();
            fragment.finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_vendor);
        }

        if let Some(usage) = chunk.usage {
            fragment.input_tokens = Some(usage.prompt_tokens);
            fragment.output_tokens = Some(usage.completion_tokens);
        }

        if fragment.is_empty() {
            return Ok(Decoded::Skip);
        }

        Ok(Decoded::Fragment(fragment))
    }
}
