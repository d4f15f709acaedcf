use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::post,
};
use futures::{StreamExt, stream};
use serde_json::{Value, json};

use super::{Behavior, Recording, TestLlmProvider, deltas};

/// OpenAI-compatible chat completions.
pub struct OpenAIMock {
    name: String,
    answer: Option<String>,
    reasoning: Option<String>,
    behavior: Behavior,
}

impl OpenAIMock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: None,
            reasoning: None,
            behavior: Behavior::Answer,
        }
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_string());
        self
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reasoning = Some(reasoning.to_string());
        self
    }

    pub fn with_error(mut self, status: u16, message: &str) -> Self {
        self.behavior = Behavior::Fail {
            status: StatusCode::from_u16(status).unwrap(),
            body: json!({ "error": { "message": message, "type": "server_error" } }),
        };
        self
    }

    pub fn with_stalled_stream(mut self) -> Self {
        self.behavior = Behavior::Stall;
        self
    }
}

#[derive(Clone)]
struct MockState {
    answer: String,
    reasoning: Option<String>,
    behavior: Behavior,
    recording: Recording,
}

impl TestLlmProvider for OpenAIMock {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "openai"
    }

    fn router(self, recording: Recording) -> Router {
        let state = MockState {
            answer: self.answer.unwrap_or_else(|| format!("Hello from {}", self.name)),
            reasoning: self.reasoning,
            behavior: self.behavior,
            recording,
        };

        Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state)
    }
}

fn chunk(delta: Value, finish_reason: Option<&str>) -> Event {
    let chunk = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "model": "mock",
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }],
    });

    Event::default().data(chunk.to_string())
}

async fn chat_completions(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.recording.record(&headers, &body);

    if let Some(failure) = state.behavior.failure() {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or("unknown").to_string();

    if !body["stream"].as_bool().unwrap_or(false) {
        return Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": state.answer,
                    "reasoning_content": state.reasoning,
                },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25 }
        }))
        .into_response();
    }

    let mut events = vec![chunk(json!({ "role": "assistant" }), None)];

    if let Some(reasoning) = &state.reasoning {
        events.push(chunk(json!({ "reasoning_content": reasoning }), None));
    }

    events.extend(deltas(&state.answer).into_iter().map(|d| chunk(json!({ "content": d }), None)));

    if matches!(state.behavior, Behavior::Stall) {
        let first = stream::iter(events.into_iter().take(2).map(Ok::<_, Infallible>));
        return Sse::new(first.chain(stream::pending())).into_response();
    }

    events.push(chunk(json!({}), Some("stop")));

    let usage = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [],
        "usage": { "prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25 }
    });

    events.push(Event::default().data(usage.to_string()));
    events.push(Event::default().data("[DONE]"));

    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>))).into_response()
}
