pub mod llms;

use std::{
    fmt::Write as _,
    net::SocketAddr,
    str::FromStr,
    sync::{Mutex, Once},
};

use config::Config;
use context::RequestContext;
use futures::StreamExt;
use llm::{ChatRequest, ChatResponse, Engine, Message, ResponseFragment};
use logforth::{
    append::{Append, Stderr},
    filter::EnvFilter,
};
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use llms::{AnthropicMock, OllamaMock, OpenAIMock, PIXEL_PNG, RecordedRequest, Recording, TestLlmProvider};

static INIT: Once = Once::new();
static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn init_logger() {
    INIT.call_once(|| {
        let filter = std::env::var("SWITCHBOARD_TEST_LOG").unwrap_or_else(|_| "llm=debug,integration_tests=debug".into());

        logforth::builder()
            .dispatch(|d| {
                let filter = EnvFilter::from_str(&filter).unwrap_or_else(|_| EnvFilter::from_str("info").unwrap());
                d.filter(filter).append(Stderr::default())
            })
            .dispatch(|d| d.filter(EnvFilter::from_str("warn").unwrap()).append(WarningCollector))
            .apply();
    });
}

/// Keeps every warning and error in memory for assertions.
#[derive(Debug)]
struct WarningCollector;

impl Append for WarningCollector {
    fn append(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<()> {
        let line = format!("{}: {}", record.level(), record.args());
        WARNINGS.lock().unwrap().push(line);

        Ok(())
    }
}

/// Warnings and errors logged so far that mention `needle`. Tests share one
/// logger, so the needle should be a name no other test uses.
pub fn logged_warnings(needle: &str) -> Vec<String> {
    WARNINGS
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.contains(needle))
        .cloned()
        .collect()
}

/// Binds an ephemeral port and serves `router` on it until the returned token is cancelled.
pub async fn serve(router: axum::Router) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();

    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await;

        if let Err(e) = result {
            log::error!("Mock server on {address} failed: {e}");
        }
    });

    (address, shutdown)
}

/// A channel backed by a mock upstream.
struct MockChannel {
    name: String,
    kind: &'static str,
    server: String,
    backup: Option<String>,
    meta: Vec<(String, String)>,
}

/// An engine wired to mock upstream servers, which shut down with it.
pub struct TestEngine {
    pub engine: Engine,
    pub config: Config,
    _mocks: Vec<DropGuard>,
    _config_dir: tempfile::TempDir,
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        init_logger();
        TestEngineBuilder::default()
    }

    pub async fn chat(&self, model: &str, prompt: &str) -> llm::Result<ChatResponse> {
        let request = ChatRequest::new(model, vec![Message::user(prompt)]);
        self.engine.chat(request, &RequestContext::new()).await
    }

    /// Streams a single-prompt request and collects every item, errors included.
    pub async fn stream(&self, model: &str, prompt: &str) -> llm::Result<Vec<llm::Result<ResponseFragment>>> {
        let request = ChatRequest::new(model, vec![Message::user(prompt)]);
        self.stream_request(request, &RequestContext::new()).await
    }

    pub async fn stream_request(
        &self,
        request: ChatRequest,
        context: &RequestContext,
    ) -> llm::Result<Vec<llm::Result<ResponseFragment>>> {
        let stream = self.engine.chat_stream(request, context).await?;
        Ok(stream.collect().await)
    }
}

#[derive(Default)]
pub struct TestEngineBuilder {
    channels: Vec<MockChannel>,
    mocks: Vec<DropGuard>,
}

impl TestEngineBuilder {
    /// Spawns a mock upstream and registers it as a channel named after the mock.
    pub async fn spawn_llm(&mut self, provider: impl TestLlmProvider) -> Recording {
        let name = provider.name().to_string();
        let kind = provider.kind();
        let recording = Recording::default();

        let (address, shutdown) = serve(provider.router(recording.clone())).await;
        self.mocks.push(shutdown.drop_guard());

        self.channels.push(MockChannel {
            name,
            kind,
            server: format!("http://{address}{}", llms::base_path(kind)),
            backup: None,
            meta: Vec::new(),
        });

        recording
    }

    pub fn backup(&mut self, channel: &str, backup: &str) {
        if let Some(entry) = self.channels.iter_mut().find(|c| c.name == channel) {
            entry.backup = Some(backup.to_string());
        }
    }

    pub fn meta(&mut self, channel: &str, key: &str, value: impl ToString) {
        if let Some(entry) = self.channels.iter_mut().find(|c| c.name == channel) {
            entry.meta.push((key.to_string(), value.to_string()));
        }
    }

    /// Loads `config` with the spawned channels appended, through the regular loader.
    pub async fn build(self, config: &str) -> TestEngine {
        let mut final_config = config.to_string();

        for channel in &self.channels {
            final_config.push_str(&indoc::formatdoc! {r#"

                [channels.{}]
                type = "{}"
                server = "{}"
                secret = "test-key"
            "#, channel.name, channel.kind, channel.server});

            if let Some(backup) = &channel.backup {
                let _ = writeln!(final_config, "backup = \"{backup}\"");
            }

            if !channel.meta.is_empty() {
                let _ = writeln!(final_config, "\n[channels.{}.meta]", channel.name);

                for (key, value) in &channel.meta {
                    let _ = writeln!(final_config, "{key} = \"{value}\"");
                }
            }
        }

        let config_dir = tempfile::tempdir().unwrap();
        let config_path = config_dir.path().join("switchboard.toml");
        std::fs::write(&config_path, &final_config).unwrap();

        let config = Config::load(&config_path).unwrap();

        TestEngine {
            engine: Engine::from_config(config.clone()),
            config,
            _mocks: self.mocks,
            _config_dir: config_dir,
        }
    }
}
