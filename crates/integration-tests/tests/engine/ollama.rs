use base64::{Engine as _, engine::general_purpose::STANDARD};
use context::RequestContext;
use indoc::indoc;
use integration_tests::{OllamaMock, PIXEL_PNG, TestEngine};
use llm::{ChatRequest, ContentPart, Message};

use super::text;

const CONFIG: &str = indoc! {r#"
    [fallback]
    provider = "ollama"
    type = "ollama"

    [models.llama3]
    temperature = 0.2
    providers = [{ id = "ollama", type = "ollama", rewrite = "llama3.1:8b" }]
"#};

#[tokio::test]
async fn non_streaming_chat() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OllamaMock::new("ollama")).await;
    builder.meta("ollama", "num_ctx", 16384);

    let engine = builder.build(CONFIG).await;

    let response = engine.chat("llama3", "Hi").await.unwrap();

    insta::assert_debug_snapshot!(response, @r#"
    ChatResponse {
        text: "Hello from ollama",
        finish_reason: Stop,
        input_tokens: 8,
        output_tokens: 4,
        reasoning_text: "",
    }
    "#);

    let body = recording.last_body();

    assert_eq!(body["model"], "llama3.1:8b");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_ctx"], 16384);
    assert!((body["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    assert!(body.get("think").is_none());
}

#[tokio::test]
async fn lines_split_across_chunks_are_reassembled() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OllamaMock::new("ollama").with_answer("one two three four").with_split_lines())
        .await;

    let engine = builder.build(CONFIG).await;

    let items = engine.stream("llama3", "Count").await.unwrap();

    assert!(items.iter().all(Result::is_ok));
    assert_eq!(text(&items), "one two three four");

    let last = items.last().unwrap().as_ref().unwrap();

    insta::assert_debug_snapshot!(last, @r#"
    ResponseFragment {
        text_delta: "",
        reasoning_delta: "",
        finish_reason: Some(
            Stop,
        ),
        input_tokens: Some(
            8,
        ),
        output_tokens: Some(
            4,
        ),
    }
    "#);
}

#[tokio::test]
async fn remote_images_are_inlined() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OllamaMock::new("ollama")).await;
    let engine = builder.build(CONFIG).await;

    let image_url = engine.config.channels["ollama"]
        .server
        .as_ref()
        .unwrap()
        .join("images/pixel.png")
        .unwrap();

    let message = Message::user("").with_parts(vec![
        ContentPart::text("What is in this picture?"),
        ContentPart::image_url(image_url.as_str(), None),
    ]);

    let request = ChatRequest::new("llama3", vec![message]);
    engine.engine.chat(request, &RequestContext::new()).await.unwrap();

    let body = recording.last_body();

    assert_eq!(body["messages"][0]["content"], "What is in this picture?");
    assert_eq!(body["messages"][0]["images"][0], STANDARD.encode(PIXEL_PNG));
}

#[tokio::test]
async fn unreachable_images_are_skipped() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OllamaMock::new("ollama")).await;
    let engine = builder.build(CONFIG).await;

    let image_url = engine.config.channels["ollama"]
        .server
        .as_ref()
        .unwrap()
        .join("images/missing.png")
        .unwrap();

    let message = Message::user("").with_parts(vec![
        ContentPart::text("What is in this picture?"),
        ContentPart::image_url(image_url.as_str(), None),
    ]);

    let request = ChatRequest::new("llama3", vec![message]);
    let response = engine.engine.chat(request, &RequestContext::new()).await.unwrap();

    assert_eq!(response.text, "Hello from ollama");
    assert!(recording.last_body()["messages"][0].get("images").is_none());
}

#[tokio::test]
async fn channel_meta_enables_thinking() {
    let mut builder = TestEngine::builder();
    let recording = builder.spawn_llm(OllamaMock::new("ollama")).await;
    builder.meta("ollama", "think", true);
    let engine = builder.build(CONFIG).await;

    engine.chat("llama3", "Why?").await.unwrap();

    assert_eq!(recording.last_body()["think"], true);
}

#[tokio::test]
async fn missing_model_is_backend_unavailable() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OllamaMock::new("ollama").with_error(404, "model 'llama3.1:8b' not found"))
        .await;

    let engine = builder.build(CONFIG).await;

    let error = engine.stream("llama3", "Hi").await.unwrap_err();

    assert_eq!(error.code(), "backend_unavailable");
    assert!(error.to_string().contains("not found"), "{error}");
}
