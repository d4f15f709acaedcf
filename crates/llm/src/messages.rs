//! The canonical conversation model shared by every stage of the engine.
//!
//! Backends translate from and to these types inside their own modules. Nothing
//! vendor-specific is allowed to leak in here.

use std::{collections::BTreeSet, fmt};

/// Capability toggles carried in [`ChatRequest::flags`].
pub mod flags {
    /// Prefer reasoning-capable providers.
    pub const REASONING: &str = "reasoning";
    /// Inject search results into the last user turn.
    pub const SEARCH: &str = "search";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost hint for image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote image, fetched by the backend or inlined by its adapter.
    Url { url: String },
    /// Inline image data.
    Base64 { media_type: String, data: String },
}

impl ImageSource {
    /// The image as a URL, using a data URL for inline images.
    pub fn to_url(&self) -> String {
        match self {
            ImageSource::Url { url } => url.clone(),
            ImageSource::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// One piece of a multi-modal message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
        detail: Option<ImageDetail>,
    },
    File {
        url: String,
        name: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>, detail: Option<ImageDetail>) -> Self {
        ContentPart::Image {
            source: ImageSource::Url { url: url.into() },
            detail,
        }
    }
}

/// A single conversation turn.
///
/// A message with a non-empty `parts` list is multi-modal, and its `text` is ignored
/// by token accounting and the backends.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            parts: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn with_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.parts = parts;
        self
    }

    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }

    /// All textual content of the message, joining text parts with newlines.
    pub fn plain_text(&self) -> String {
        if !self.is_multipart() {
            return self.text.clone();
        }

        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        texts.join("\n")
    }

    /// Put `prefix` in front of the message content, keeping any other parts in place.
    pub fn prepend_text(&mut self, prefix: &str) {
        if !self.is_multipart() {
            self.text = format!("{prefix}{}", self.text);
            return;
        }

        match self.parts.iter_mut().find_map(|part| match part {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }) {
            Some(text) => *text = format!("{prefix}{text}"),
            None => self.parts.insert(0, ContentPart::text(prefix)),
        }
    }
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    /// Zero lets the backend choose.
    pub max_tokens: u32,
    /// Zero means "not specified", so model defaults may apply.
    pub temperature: f32,
    pub flags: BTreeSet<String>,
    /// Zero means "not specified".
    pub search_result_count: usize,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            max_tokens: 0,
            temperature: 0.0,
            flags: BTreeSet::new(),
            search_result_count: 0,
        }
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_string());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// Removes a flag, returning whether it was set.
    pub fn take_flag(&mut self, flag: &str) -> bool {
        self.flags.remove(flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Maps the stop reasons used by the supported vendors.
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "content_filter" | "refusal" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => f.write_str("stop"),
            FinishReason::Length => f.write_str("length"),
            FinishReason::ContentFilter => f.write_str("content_filter"),
            FinishReason::Other(other) => f.write_str(other),
        }
    }
}

/// A complete, non-streaming response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatResponse {
    pub text: String,
    pub finish_reason: FinishReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_text: String,
}

/// One incremental unit of a streamed response.
///
/// Errors travel as the `Err` side of the stream item, never inside a fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseFragment {
    pub text_delta: String,
    pub reasoning_delta: String,
    pub finish_reason: Option<FinishReason>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl ResponseFragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text_delta: delta.into(),
            ..Default::default()
        }
    }

    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self {
            reasoning_delta: delta.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text_delta.is_empty()
            && self.reasoning_delta.is_empty()
            && self.finish_reason.is_none()
            && self.input_tokens.is_none()
            && self.output_tokens.is_none()
    }
}
