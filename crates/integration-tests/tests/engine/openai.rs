use context::RequestContext;
use indoc::indoc;
use integration_tests::{OpenAIMock, TestEngine};
use llm::{ChatRequest, Message};

use super::text;

const CONFIG: &str = indoc! {r#"
    [fallback]
    provider = "openai"

    [models.gpt-4o]
    system_prompt = "Be concise."
    providers = [{ id = "openai", type = "openai", rewrite = "gpt-4o-2024-08-06" }]
"#};

#[tokio::test]
async fn non_streaming_completion() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OpenAIMock::new("openai")).await;
    let engine = builder.build(CONFIG).await;

    let response = engine.chat("gpt-4o", "Hi").await.unwrap();

    insta::assert_debug_snapshot!(response, @r#"
    ChatResponse {
        text: "Hello from openai",
        finish_reason: Stop,
        input_tokens: 10,
        output_tokens: 15,
        reasoning_text: "",
    }
    "#);

    let request = &recording.requests()[0];

    assert_eq!(request.header("authorization"), Some("Bearer test-key"));
    assert_eq!(request.body["model"], "gpt-4o-2024-08-06");
    assert_eq!(request.body["stream"], false);
    assert_eq!(request.body["messages"][0]["role"], "system");
    assert_eq!(request.body["messages"][0]["content"], "Be concise.");
    assert_eq!(request.body["messages"][1]["content"], "Hi");
    assert!(request.body.get("stream_options").is_none());
}

#[tokio::test]
async fn streaming_completion() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OpenAIMock::new("openai")).await;
    let engine = builder.build(CONFIG).await;

    let items = engine.stream("gpt-4o", "Hi").await.unwrap();

    assert_eq!(text(&items), "Hello from openai");

    let tail: Vec<_> = items.iter().rev().take(2).rev().map(|item| item.as_ref().unwrap()).collect();

    insta::assert_debug_snapshot!(tail, @r#"
    [
        ResponseFragment {
            text_delta: "",
            reasoning_delta: "",
            finish_reason: Some(
                Stop,
            ),
            input_tokens: None,
            output_tokens: None,
        },
        ResponseFragment {
            text_delta: "",
            reasoning_delta: "",
            finish_reason: None,
            input_tokens: Some(
                10,
            ),
            output_tokens: Some(
                15,
            ),
        },
    ]
    "#);

    let body = recording.last_body();

    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);
}

#[tokio::test]
async fn reasoning_content_is_separate_from_text() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("openai").with_reasoning("The user says hi."))
        .await;

    let engine = builder.build(CONFIG).await;

    let response = engine.chat("gpt-4o", "Hi").await.unwrap();
    assert_eq!(response.reasoning_text, "The user says hi.");
    assert_eq!(response.text, "Hello from openai");

    let items = engine.stream("gpt-4o", "Hi").await.unwrap();
    let reasoning: String = items.iter().map(|item| item.as_ref().unwrap().reasoning_delta.as_str()).collect();

    assert_eq!(reasoning, "The user says hi.");
    assert_eq!(text(&items), "Hello from openai");
}

#[tokio::test]
async fn request_parameters_are_forwarded() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OpenAIMock::new("openai")).await;
    let engine = builder.build(CONFIG).await;

    let mut request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);
    request.max_tokens = 64;
    request.temperature = 0.5;

    let context = RequestContext::new().with_seed(Some(42));
    engine.engine.chat(request, &context).await.unwrap();

    let body = recording.last_body();

    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["temperature"], 0.5);
    assert_eq!(body["seed"], 42);
}

#[tokio::test]
async fn rate_limit_is_backend_unavailable() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("openai").with_error(429, "Rate limit reached"))
        .await;

    let engine = builder.build(CONFIG).await;

    let error = engine.chat("gpt-4o", "Hi").await.unwrap_err();

    assert_eq!(error.code(), "backend_unavailable");
    assert!(error.to_string().contains("Rate limit reached"), "{error}");
}

#[tokio::test]
async fn context_length_rejection_is_context_too_large() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("openai").with_error(
            400,
            "This model's maximum context length is 8192 tokens. However, your messages resulted in 9000 tokens.",
        ))
        .await;

    let engine = builder.build(CONFIG).await;

    let error = engine.chat("gpt-4o", "Hi").await.unwrap_err();

    assert_eq!(error.code(), "context_too_large");
    assert!(error.is_user_correctable());
}
