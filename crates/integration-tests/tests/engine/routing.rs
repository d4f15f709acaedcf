use context::RequestContext;
use indoc::indoc;
use integration_tests::{OpenAIMock, TestEngine};
use llm::{ChatRequest, LlmError, Message, messages::flags};

const CONFIG: &str = indoc! {r#"
    [fallback]
    provider = "general"

    [models.deepseek]
    system_prompt = "Answer in one sentence."

    [[models.deepseek.providers]]
    id = "fast"
    type = "openai"
    rewrite = "deepseek-chat"

    [[models.deepseek.providers]]
    id = "thinker"
    type = "openai"
    reasoning = true
    rewrite = "deepseek-reasoner"

    [[models.deepseek.providers]]
    id = "cheap"
    type = "openai"
    priority = 10
    channel = "general"

    [models.internal]
    restricted = true
    providers = [{ id = "general", type = "openai" }]

    [models.ghost]
    providers = [{ id = "ghost", type = "openai" }]
"#};

async fn engine() -> (TestEngine, [integration_tests::Recording; 3]) {
    let mut builder = TestEngine::builder();

    let fast = builder.spawn_llm(OpenAIMock::new("fast")).await;
    let thinker = builder
        .spawn_llm(OpenAIMock::new("thinker").with_reasoning("Considering the options."))
        .await;
    let general = builder.spawn_llm(OpenAIMock::new("general")).await;

    (builder.build(CONFIG).await, [fast, thinker, general])
}

#[tokio::test]
async fn highest_priority_default_provider_wins() {
    let (engine, [fast, thinker, general]) = engine().await;

    let response = engine.chat("deepseek", "Hi").await.unwrap();

    assert_eq!(response.text, "Hello from general");
    assert_eq!(general.last_body()["model"], "deepseek");
    assert_eq!(fast.count(), 0);
    assert_eq!(thinker.count(), 0);
}

#[tokio::test]
async fn reasoning_flag_selects_reasoning_provider() {
    let (engine, [fast, thinker, general]) = engine().await;

    let request = ChatRequest::new("deepseek", vec![Message::user("Why is the sky blue?")]).with_flag(flags::REASONING);
    let response = engine.engine.chat(request, &RequestContext::new()).await.unwrap();

    assert_eq!(response.reasoning_text, "Considering the options.");
    assert_eq!(response.text, "Hello from thinker");

    let body = thinker.last_body();

    assert_eq!(body["model"], "deepseek-reasoner");
    assert_eq!(body["messages"][0]["content"], "Answer in one sentence.");
    assert_eq!(fast.count() + general.count(), 0);
}

#[tokio::test]
async fn unknown_model_goes_to_fallback_unchanged() {
    let (engine, [fast, thinker, general]) = engine().await;

    let response = engine.chat("mystery-model-7b", "Hi").await.unwrap();

    assert_eq!(response.text, "Hello from general");
    assert_eq!(general.last_body()["model"], "mystery-model-7b");
    assert_eq!(fast.count() + thinker.count(), 0);
}

#[tokio::test]
async fn restricted_model_requires_permission() {
    let (engine, [_, _, general]) = engine().await;

    let error = engine.chat("internal", "Hi").await.unwrap_err();

    assert_eq!(error, LlmError::ModelRestricted("internal".to_string()));
    assert!(error.is_user_correctable());
    assert_eq!(general.count(), 0);

    let request = ChatRequest::new("internal", vec![Message::user("Hi")]);
    let context = RequestContext::new().allow_restricted(true);

    let response = engine.engine.chat(request, &context).await.unwrap();

    assert_eq!(response.text, "Hello from general");
    assert_eq!(general.count(), 1);
}

#[tokio::test]
async fn provider_without_channel_is_unavailable() {
    let (engine, [fast, thinker, general]) = engine().await;

    let error = engine.chat("ghost", "Hi").await.unwrap_err();

    assert_eq!(error.code(), "backend_unavailable");
    assert_eq!(fast.count() + thinker.count() + general.count(), 0);

    let error = engine.stream("ghost", "Hi").await.unwrap_err();
    assert_eq!(error.code(), "backend_unavailable");
}

#[tokio::test]
async fn conversation_is_normalized_before_dispatch() {
    let (engine, [_, _, general]) = engine().await;

    let request = ChatRequest::new(
        "mystery-model-7b",
        vec![
            Message::assistant("Welcome back!"),
            Message::user("First question"),
            Message::user("Second question"),
        ],
    );

    engine.engine.chat(request, &RequestContext::new()).await.unwrap();

    let roles: Vec<String> = general.last_body()["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap().to_string())
        .collect();

    for pair in roles.windows(2) {
        assert_ne!(pair[0], pair[1], "{roles:?}");
    }

    assert_eq!(roles.last().map(String::as_str), Some("user"));
}
