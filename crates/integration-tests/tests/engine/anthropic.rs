use indoc::indoc;
use integration_tests::{AnthropicMock, TestEngine};

use super::{errors, text};

const CONFIG: &str = indoc! {r#"
    [fallback]
    provider = "anthropic"
    type = "anthropic"

    [models.claude]
    system_prompt = "You are a helpful assistant."
    providers = [{ id = "anthropic", type = "anthropic", rewrite = "claude-sonnet-4-20250514" }]
"#};

#[tokio::test]
async fn system_prompt_moves_to_system_field() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(AnthropicMock::new("anthropic")).await;
    let engine = builder.build(CONFIG).await;

    let response = engine.chat("claude", "Hi").await.unwrap();

    insta::assert_debug_snapshot!(response, @r#"
    ChatResponse {
        text: "Hello from anthropic",
        finish_reason: Stop,
        input_tokens: 12,
        output_tokens: 6,
        reasoning_text: "",
    }
    "#);

    let request = &recording.requests()[0];

    assert_eq!(request.header("x-api-key"), Some("test-key"));
    assert_eq!(request.header("anthropic-version"), Some("2023-06-01"));
    assert_eq!(request.body["model"], "claude-sonnet-4-20250514");
    assert_eq!(request.body["system"], "You are a helpful assistant.");
    assert_eq!(request.body["max_tokens"], 4096);
    assert_eq!(request.body["messages"].as_array().map(Vec::len), Some(1));
    assert_eq!(request.body["messages"][0]["role"], "user");
    assert!(request.body.get("thinking").is_none());
}

#[tokio::test]
async fn thinking_budget_from_channel_meta() {
    let mut builder = TestEngine::builder();
    let recording = builder
        .spawn_llm(AnthropicMock::new("anthropic").with_thinking("Short greeting, answer politely."))
        .await;

    builder.meta("anthropic", "thinking_budget", 1024);
    let engine = builder.build(CONFIG).await;

    let response = engine.chat("claude", "Hi").await.unwrap();

    assert_eq!(response.reasoning_text, "Short greeting, answer politely.");
    assert_eq!(response.text, "Hello from anthropic");

    let body = recording.last_body();

    assert_eq!(body["thinking"]["type"], "enabled");
    assert_eq!(body["thinking"]["budget_tokens"], 1024);
    assert_eq!(body["max_tokens"], 5120);
    assert!(body.get("temperature").is_none());
}

#[tokio::test]
async fn streaming_with_thinking() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(AnthropicMock::new("anthropic").with_thinking("Let me think."))
        .await;

    let engine = builder.build(CONFIG).await;

    let items = engine.stream("claude", "Hi").await.unwrap();

    let fragments: Vec<_> = items.into_iter().map(Result::unwrap).collect();

    insta::assert_debug_snapshot!(fragments, @r#"
    [
        ResponseFragment {
            text_delta: "",
            reasoning_delta: "",
            finish_reason: None,
            input_tokens: Some(
                12,
            ),
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "",
            reasoning_delta: "Let me think.",
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "Hello ",
            reasoning_delta: "",
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "from ",
            reasoning_delta: "",
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "anthropic",
            reasoning_delta: "",
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "",
            reasoning_delta: "",
            finish_reason: Some(
                Stop,
            ),
            input_tokens: None,
            output_tokens: Some(
                6,
            ),
        },
    ]
    "#);
}

#[tokio::test]
async fn error_event_ends_the_stream() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(AnthropicMock::new("anthropic").with_error_event("overloaded_error", "Overloaded"))
        .await;

    let engine = builder.build(CONFIG).await;

    let items = engine.stream("claude", "Hi").await.unwrap();

    assert_eq!(text(&items), "Hello ");
    assert_eq!(errors(&items), ["backend_unavailable"]);
    assert!(items.last().unwrap().is_err());

    insta::assert_snapshot!(
        items.last().unwrap().as_ref().unwrap_err(),
        @"Backend 'anthropic' unavailable: overloaded_error: Overloaded"
    );
}

#[tokio::test]
async fn overloaded_status_is_backend_unavailable() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(AnthropicMock::new("anthropic").with_error(529, "overloaded_error", "Overloaded"))
        .await;

    let engine = builder.build(CONFIG).await;

    let error = engine.chat("claude", "Hi").await.unwrap_err();
    assert_eq!(error.code(), "backend_unavailable");

    let error = engine.stream("claude", "Hi").await.unwrap_err();
    assert_eq!(error.code(), "backend_unavailable");
}
