use std::convert::Infallible;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::stream;
use serde_json::{Value, json};

use super::{Behavior, Recording, TestLlmProvider, deltas};

/// Bytes served at `/images/pixel.png`.
pub const PIXEL_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmock";

/// Ollama chat API with newline-delimited JSON streaming.
pub struct OllamaMock {
    name: String,
    answer: Option<String>,
    behavior: Behavior,
    split_lines: bool,
}

impl OllamaMock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: None,
            behavior: Behavior::Answer,
            split_lines: false,
        }
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_string());
        self
    }

    pub fn with_error(mut self, status: u16, message: &str) -> Self {
        self.behavior = Behavior::Fail {
            status: StatusCode::from_u16(status).unwrap(),
            body: json!({ "error": message }),
        };
        self
    }

    /// Sends every line in two body chunks, split in the middle of the JSON.
    pub fn with_split_lines(mut self) -> Self {
        self.split_lines = true;
        self
    }
}

#[derive(Clone)]
struct MockState {
    answer: String,
    behavior: Behavior,
    split_lines: bool,
    recording: Recording,
}

impl TestLlmProvider for OllamaMock {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ollama"
    }

    fn router(self, recording: Recording) -> Router {
        let state = MockState {
            answer: self.answer.unwrap_or_else(|| format!("Hello from {}", self.name)),
            behavior: self.behavior,
            split_lines: self.split_lines,
            recording,
        };

        Router::new()
            .route("/api/chat", post(chat))
            .route("/images/pixel.png", get(pixel))
            .with_state(state)
    }
}

async fn pixel() -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/png")], PIXEL_PNG)
}

async fn chat(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.recording.record(&headers, &body);

    if let Some(failure) = state.behavior.failure() {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or("unknown").to_string();

    let done = json!({
        "model": model,
        "message": { "role": "assistant", "content": "" },
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 8,
        "eval_count": 4
    });

    if !body["stream"].as_bool().unwrap_or(false) {
        let mut response = done;
        response["message"]["content"] = Value::String(state.answer.clone());

        return Json(response).into_response();
    }

    let mut lines: Vec<String> = deltas(&state.answer)
        .into_iter()
        .map(|delta| {
            json!({
                "model": model,
                "message": { "role": "assistant", "content": delta },
                "done": false
            })
            .to_string()
        })
        .collect();

    lines.push(done.to_string());

    let chunks: Vec<String> = lines
        .into_iter()
        .flat_map(|line| {
            let line = format!("{line}\n");

            if state.split_lines {
                let (head, tail) = line.split_at(line.len() / 2);
                vec![head.to_string(), tail.to_string()]
            } else {
                vec![line]
            }
        })
        .collect();

    Response::builder()
        .header(CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream::iter(chunks.into_iter().map(Ok::<_, Infallible>))))
        .unwrap()
}
