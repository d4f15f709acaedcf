use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::post,
};
use futures::stream;
use serde_json::{Value, json};

use super::{Behavior, Recording, TestLlmProvider, deltas};

/// Anthropic messages API.
pub struct AnthropicMock {
    name: String,
    answer: Option<String>,
    thinking: Option<String>,
    behavior: Behavior,
    error_event: Option<(String, String)>,
}

impl AnthropicMock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: None,
            thinking: None,
            behavior: Behavior::Answer,
            error_event: None,
        }
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_string());
        self
    }

    pub fn with_thinking(mut self, thinking: &str) -> Self {
        self.thinking = Some(thinking.to_string());
        self
    }

    /// Fails the request with an Anthropic error envelope.
    pub fn with_error(mut self, status: u16, error_type: &str, message: &str) -> Self {
        self.behavior = Behavior::Fail {
            status: StatusCode::from_u16(status).unwrap(),
            body: json!({ "type": "error", "error": { "type": error_type, "message": message } }),
        };
        self
    }

    /// Sends an `error` event after the first text delta.
    pub fn with_error_event(mut self, error_type: &str, message: &str) -> Self {
        self.error_event = Some((error_type.to_string(), message.to_string()));
        self
    }
}

#[derive(Clone)]
struct MockState {
    answer: String,
    thinking: Option<String>,
    behavior: Behavior,
    error_event: Option<(String, String)>,
    recording: Recording,
}

impl TestLlmProvider for AnthropicMock {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "anthropic"
    }

    fn router(self, recording: Recording) -> Router {
        let state = MockState {
            answer: self.answer.unwrap_or_else(|| format!("Hello from {}", self.name)),
            thinking: self.thinking,
            behavior: self.behavior,
            error_event: self.error_event,
            recording,
        };

        Router::new().route("/v1/messages", post(messages)).with_state(state)
    }
}

fn event(name: &str, data: Value) -> Event {
    Event::default().event(name).data(data.to_string())
}

async fn messages(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.recording.record(&headers, &body);

    if let Some(failure) = state.behavior.failure() {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or("unknown").to_string();

    if !body["stream"].as_bool().unwrap_or(false) {
        let mut content = Vec::new();

        if let Some(thinking) = &state.thinking {
            content.push(json!({ "type": "thinking", "thinking": thinking, "signature": "mock" }));
        }

        content.push(json!({ "type": "text", "text": state.answer }));

        return Json(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "model": model,
            "content": content,
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 12, "output_tokens": 6 }
        }))
        .into_response();
    }

    let mut events = vec![
        event(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": "msg_mock", "type": "message", "role": "assistant", "model": model,
                    "content": [], "usage": { "input_tokens": 12, "output_tokens": 1 }
                }
            }),
        ),
        event("ping", json!({ "type": "ping" })),
    ];

    let mut index = 0;

    if let Some(thinking) = &state.thinking {
        events.push(event(
            "content_block_start",
            json!({ "type": "content_block_start", "index": index, "content_block": { "type": "thinking", "thinking": "" } }),
        ));
        events.push(event(
            "content_block_delta",
            json!({ "type": "content_block_delta", "index": index, "delta": { "type": "thinking_delta", "thinking": thinking } }),
        ));
        events.push(event(
            "content_block_delta",
            json!({ "type": "content_block_delta", "index": index, "delta": { "type": "signature_delta", "signature": "mock" } }),
        ));
        events.push(event(
            "content_block_stop",
            json!({ "type": "content_block_stop", "index": index }),
        ));

        index += 1;
    }

    events.push(event(
        "content_block_start",
        json!({ "type": "content_block_start", "index": index, "content_block": { "type": "text", "text": "" } }),
    ));

    for delta in deltas(&state.answer) {
        events.push(event(
            "content_block_delta",
            json!({ "type": "content_block_delta", "index": index, "delta": { "type": "text_delta", "text": delta } }),
        ));

        if let Some((error_type, message)) = &state.error_event {
            events.push(event(
                "error",
                json!({ "type": "error", "error": { "type": error_type, "message": message } }),
            ));
            break;
        }
    }

    events.push(event(
        "content_block_stop",
        json!({ "type": "content_block_stop", "index": index }),
    ));
    events.push(event(
        "message_delta",
        json!({ "type": "message_delta", "delta": { "stop_reason": "end_turn", "stop_sequence": null }, "usage": { "output_tokens": 6 } }),
    ));
    events.push(event("message_stop", json!({ "type": "message_stop" })));

    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>))).into_response()
}
