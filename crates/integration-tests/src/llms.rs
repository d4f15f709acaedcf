//! Mock upstream servers speaking the wire formats of the supported backends.

mod anthropic;
mod ollama;
mod openai;

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

pub use anthropic::AnthropicMock;
pub use ollama::{OllamaMock, PIXEL_PNG};
pub use openai::OpenAIMock;

/// A mock upstream that can be mounted as a channel.
pub trait TestLlmProvider: Send + 'static {
    /// Channel name, also used in the mock's answers.
    fn name(&self) -> &str;

    /// The channel `type` this mock speaks.
    fn kind(&self) -> &'static str;

    fn router(self, recording: Recording) -> axum::Router;
}

/// Path prefix the backend of `kind` appends its endpoints to.
pub(crate) fn base_path(kind: &str) -> &'static str {
    match kind {
        "ollama" => "",
        _ => "/v1",
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Requests received by a mock, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Recording {
    pub(crate) fn record(&self, headers: &HeaderMap, body: &Value) {
        self.requests.lock().unwrap().push(RecordedRequest {
            headers: headers.clone(),
            body: body.clone(),
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Body of the last request.
    pub fn last_body(&self) -> Value {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.body.clone())
            .unwrap_or(Value::Null)
    }
}

/// What a mock does with every request.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Answer,
    Fail { status: StatusCode, body: Value },
    /// Streams the first fragment, then never finishes.
    Stall,
}

impl Behavior {
    pub(crate) fn failure(&self) -> Option<Response> {
        match self {
            Behavior::Fail { status, body } => Some((*status, Json(body.clone())).into_response()),
            _ => None,
        }
    }
}

/// Splits an answer into streaming deltas, keeping the whitespace.
pub(crate) fn deltas(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}
