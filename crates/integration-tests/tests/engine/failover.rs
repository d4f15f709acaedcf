use std::time::Duration;

use context::{CancellationToken, RequestContext};
use futures::StreamExt;
use indoc::indoc;
use integration_tests::{AnthropicMock, OpenAIMock, TestEngine, logged_warnings};
use llm::{ChatRequest, Message};

use super::{errors, text};

const CONFIG: &str = indoc! {r#"
    [fallback]
    provider = "main"

    [models.gpt-4o]
    providers = [{ id = "main", type = "openai" }]
"#};

#[tokio::test]
async fn main_failure_falls_back_to_backup() {
    let mut builder = TestEngine::builder();
    let main = builder
        .spawn_llm(OpenAIMock::new("main").with_error(503, "Service unavailable"))
        .await;
    let backup = builder.spawn_llm(OpenAIMock::new("backup")).await;
    builder.backup("main", "backup");

    let engine = builder.build(CONFIG).await;

    let response = engine.chat("gpt-4o", "Hi").await.unwrap();

    assert_eq!(response.text, "Hello from backup");
    assert_eq!(main.count(), 1);
    assert_eq!(backup.count(), 1);
    assert_eq!(backup.last_body()["messages"], main.last_body()["messages"]);
}

#[tokio::test]
async fn stream_failure_before_first_fragment_falls_back() {
    let mut builder = TestEngine::builder();
    let main = builder
        .spawn_llm(OpenAIMock::new("main").with_error(503, "Service unavailable"))
        .await;
    let backup = builder.spawn_llm(OpenAIMock::new("backup")).await;
    builder.backup("main", "backup");

    let engine = builder.build(CONFIG).await;

    let items = engine.stream("gpt-4o", "Hi").await.unwrap();

    assert_eq!(text(&items), "Hello from backup");
    assert!(errors(&items).is_empty());
    assert_eq!(main.count(), 1);
    assert_eq!(backup.count(), 1);
}

#[tokio::test]
async fn failed_main_is_reported_once() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("flaky-main").with_error(503, "Service unavailable"))
        .await;
    builder.spawn_llm(OpenAIMock::new("steady-backup")).await;
    builder.backup("flaky-main", "steady-backup");

    let engine = builder
        .build(indoc! {r#"
            [fallback]
            provider = "flaky-main"

            [models.gpt-4o]
            providers = [{ id = "flaky-main", type = "openai" }]
        "#})
        .await;

    let items = engine.stream("gpt-4o", "Hi").await.unwrap();
    assert_eq!(text(&items), "Hello from steady-backup");

    let warnings = logged_warnings("flaky-main");

    assert_eq!(warnings.len(), 1, "{warnings:#?}");
    assert!(warnings[0].starts_with("WARN: Backend 'flaky-main' of 'flaky-main' failed (backend_unavailable)"));
}

#[tokio::test]
async fn backup_may_speak_another_protocol() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("main").with_error(500, "Internal error"))
        .await;
    let backup = builder.spawn_llm(AnthropicMock::new("claude")).await;
    builder.backup("main", "claude");

    let engine = builder.build(CONFIG).await;

    let response = engine.chat("gpt-4o", "Hi").await.unwrap();

    assert_eq!(response.text, "Hello from claude");
    assert_eq!(backup.last_body()["model"], "gpt-4o");
}

#[tokio::test]
async fn rejected_request_also_falls_back() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("main").with_error(400, "Unsupported parameter: seed"))
        .await;
    builder.spawn_llm(OpenAIMock::new("backup")).await;
    builder.backup("main", "backup");

    let engine = builder.build(CONFIG).await;

    let response = engine.chat("gpt-4o", "Hi").await.unwrap();

    assert_eq!(response.text, "Hello from backup");
}

#[tokio::test]
async fn prefer_backup_skips_main() {
    let mut builder = TestEngine::builder();
    let main = builder.spawn_llm(OpenAIMock::new("main")).await;
    let backup = builder.spawn_llm(OpenAIMock::new("backup")).await;
    builder.backup("main", "backup");

    let engine = builder.build(CONFIG).await;

    let request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);
    let context = RequestContext::new().prefer_backup(true);

    let response = engine.engine.chat(request, &context).await.unwrap();

    assert_eq!(response.text, "Hello from backup");
    assert_eq!(main.count(), 0);
    assert_eq!(backup.count(), 1);
}

#[tokio::test]
async fn prefer_backup_without_backup_uses_main() {
    let mut builder = TestEngine::builder();
    builder.spawn_llm(OpenAIMock::new("main")).await;

    let engine = builder.build(CONFIG).await;

    let request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);
    let context = RequestContext::new().prefer_backup(true);

    let response = engine.engine.chat(request, &context).await.unwrap();

    assert_eq!(response.text, "Hello from main");
}

#[tokio::test]
async fn both_failing_returns_backup_error() {
    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(OpenAIMock::new("main").with_error(503, "Main is down"))
        .await;
    builder
        .spawn_llm(OpenAIMock::new("backup").with_error(502, "Backup is down"))
        .await;
    builder.backup("main", "backup");

    let engine = builder.build(CONFIG).await;

    let error = engine.chat("gpt-4o", "Hi").await.unwrap_err();

    assert_eq!(error.code(), "backend_unavailable");
    assert!(error.to_string().contains("Backup is down"), "{error}");
}

#[tokio::test]
async fn failure_inside_stream_is_not_retried() {
    let config = indoc! {r#"
        [fallback]
        provider = "main"
        type = "anthropic"

        [models.claude]
        providers = [{ id = "main", type = "anthropic" }]
    "#};

    let mut builder = TestEngine::builder();
    builder
        .spawn_llm(AnthropicMock::new("main").with_error_event("overloaded_error", "Overloaded"))
        .await;
    let backup = builder.spawn_llm(OpenAIMock::new("backup")).await;
    builder.backup("main", "backup");

    let engine = builder.build(config).await;

    let items = engine.stream("claude", "Hi").await.unwrap();

    assert_eq!(text(&items), "Hello ");
    assert_eq!(errors(&items), ["backend_unavailable"]);
    assert_eq!(backup.count(), 0);
}

#[tokio::test]
async fn cancellation_closes_a_stalled_stream() {
    let mut builder = TestEngine::builder();
    builder.spawn_llm(OpenAIMock::new("main").with_stalled_stream()).await;

    let engine = builder.build(CONFIG).await;

    let cancellation = CancellationToken::new();
    let context = RequestContext::new().with_cancellation(cancellation.clone());
    let request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);

    let mut stream = engine.engine.chat_stream(request, &context).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text_delta, "Hello ");

    cancellation.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), stream.next()).await.unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn cancelled_request_never_reaches_upstream() {
    let mut builder = TestEngine::builder();
    let main = builder.spawn_llm(OpenAIMock::new("main")).await;

    let engine = builder.build(CONFIG).await;

    let context = RequestContext::new();
    context.cancellation.cancel();

    let request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);
    let error = engine.engine.chat(request, &context).await.unwrap_err();

    assert_eq!(error.code(), "cancelled");
    assert_eq!(main.count(), 0);
}
