//! The request pipeline: normalize, route, fit the window, augment, dispatch.

mod tracing;

use std::{future::Future, sync::Arc};

use config::{Config, EngineConfig};
use context::RequestContext;

use self::tracing::EngineWithTracing;
use crate::{
    augment,
    backend::{Backend, BackendBuilder, BackendFactory, Failover},
    catalog::{Channel, ModelCatalog, StaticCatalog},
    error::LlmError,
    messages::{ChatRequest, ChatResponse, flags},
    normalize,
    search::Searcher,
    selector::{Selection, Selector},
    stream::FragmentStream,
    upload::Uploader,
    window::{self, WindowLimits},
};

/// Operations the engine exposes, composable with middleware such as tracing.
pub(crate) trait ChatService: Send + Sync {
    fn chat(
        &self,
        request: ChatRequest,
        context: &RequestContext,
    ) -> impl Future<Output = crate::Result<ChatResponse>> + Send;

    fn chat_stream(
        &self,
        request: ChatRequest,
        context: &RequestContext,
    ) -> impl Future<Output = crate::Result<FragmentStream>> + Send;
}

/// Entry point for callers. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    service: Arc<EngineWithTracing<Pipeline>>,
}

impl Engine {
    pub fn builder(catalog: Arc<dyn ModelCatalog>) -> EngineBuilder {
        EngineBuilder {
            catalog,
            settings: EngineConfig::default(),
            backends: None,
            searcher: None,
            uploader: None,
        }
    }

    /// An engine with the built-in HTTP backends and no search or upload collaborators.
    pub fn from_config(config: Config) -> Self {
        let settings = config.engine.clone();

        Self::builder(Arc::new(StaticCatalog::new(config)))
            .with_settings(settings)
            .build()
    }

    /// Sends a request and waits for the complete response.
    pub async fn chat(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        self.service.chat(request, context).await
    }

    /// Sends a request and returns the live response.
    ///
    /// The stream ends without an error item when the request context is cancelled.
    pub async fn chat_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        self.service.chat_stream(request, context).await
    }
}

pub struct EngineBuilder {
    catalog: Arc<dyn ModelCatalog>,
    settings: EngineConfig,
    backends: Option<Arc<dyn BackendBuilder>>,
    searcher: Option<Arc<dyn Searcher>>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl EngineBuilder {
    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the built-in HTTP backends.
    pub fn with_backends(mut self, backends: Arc<dyn BackendBuilder>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn with_searcher(mut self, searcher: Arc<dyn Searcher>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    /// Used by the built-in backends. Ignored when custom backends are set.
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn build(self) -> Engine {
        let backends = self.backends.unwrap_or_else(|| {
            let mut factory = BackendFactory::new(self.settings.stream_buffer);

            if let Some(uploader) = self.uploader {
                factory = factory.with_uploader(uploader);
            }

            Arc::new(factory)
        });

        log::debug!(
            "Engine ready: {} turns, {} input tokens, search {}",
            self.settings.max_turns,
            self.settings.max_input_tokens,
            if self.searcher.is_some() { "enabled" } else { "disabled" },
        );

        let pipeline = Pipeline {
            selector: Selector::new(self.catalog.clone()),
            catalog: self.catalog,
            backends,
            searcher: self.searcher,
            settings: self.settings,
        };

        Engine {
            service: Arc::new(EngineWithTracing::new(pipeline)),
        }
    }
}

pub(crate) struct Pipeline {
    catalog: Arc<dyn ModelCatalog>,
    selector: Selector,
    backends: Arc<dyn BackendBuilder>,
    searcher: Option<Arc<dyn Searcher>>,
    settings: EngineConfig,
}

impl Pipeline {
    /// Turns a caller request into the outbound request and the backend pair serving it.
    async fn prepare(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<(Failover, ChatRequest)> {
        request.messages = normalize::fix(std::mem::take(&mut request.messages))?;

        let selection = self.selector.resolve(&request.model, &request.flags);
        selection.ensure_allowed(context)?;
        selection.apply(&mut request);

        let backend = self.failover(&selection);

        let limits = WindowLimits {
            max_turns: self.settings.max_turns,
            max_tokens: self.input_budget(&backend, &selection),
            max_message_tokens: self.settings.max_message_tokens,
        };

        let mut unaugmented = None;

        if request.has_flag(flags::SEARCH) {
            match &self.searcher {
                Some(searcher) => {
                    let count = match request.search_result_count {
                        0 => self.settings.search_results,
                        count => count,
                    };

                    let messages = request.messages.clone();

                    if augment::augment(&mut request, searcher.as_ref(), count, self.settings.search_timeout).await {
                        unaugmented = Some(messages);
                    }
                }
                None => {
                    log::warn!("Search requested for '{}' but no searcher is configured", selection.model);
                    request.take_flag(flags::SEARCH);
                }
            }
        }

        // Search results count against the budget; if they do not fit, the turn goes out without them.
        request.messages = match window::fix_context_window(std::mem::take(&mut request.messages), &request.model, limits) {
            Ok(messages) => messages,
            Err(error @ (LlmError::ContextTooLarge(_) | LlmError::MessageTooLong { .. })) => match unaugmented {
                Some(messages) => {
                    log::warn!(
                        "Search results do not fit the context window of '{}', sending the request without them: {error}",
                        selection.model
                    );

                    window::fix_context_window(messages, &request.model, limits)?
                }
                None => return Err(error),
            },
            Err(error) => return Err(error),
        };

        log::debug!(
            "Dispatching '{}' as '{}' through '{}' with {} messages",
            selection.model,
            request.model,
            backend.name(),
            request.messages.len()
        );

        Ok((backend, request))
    }

    /// The smallest of the backend, model and engine limits. Zero means unknown.
    fn input_budget(&self, backend: &Failover, selection: &Selection) -> usize {
        [
            backend.max_context_length(selection.outbound_model()),
            selection.metadata.max_context.unwrap_or_default(),
            self.settings.max_input_tokens,
        ]
        .into_iter()
        .filter(|limit| *limit > 0)
        .min()
        .unwrap_or(usize::MAX)
    }

    fn failover(&self, selection: &Selection) -> Failover {
        let channel_id = selection.selected.channel_id();

        let Some(channel) = self.catalog.lookup_channel(channel_id) else {
            log::warn!("Channel '{channel_id}' of model '{}' is not configured", selection.model);
            return Failover::new(channel_id, None, None);
        };

        let backup = channel.backup.as_deref().and_then(|backup_id| {
            let backup = self.catalog.lookup_channel(backup_id);

            if backup.is_none() {
                log::warn!("Backup channel '{backup_id}' of '{channel_id}' is not configured");
            }

            self.build_backend(&backup?)
        });

        Failover::new(channel_id, self.build_backend(&channel), backup)
    }

    fn build_backend(&self, channel: &Channel) -> Option<Arc<dyn Backend>> {
        match self.backends.build(channel) {
            Ok(backend) => Some(backend),
            Err(error) => {
                log::error!("Failed to create backend for channel '{}': {error}", channel.id);
                None
            }
        }
    }
}

impl ChatService for Pipeline {
    async fn chat(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        let work = async {
            let (backend, request) = self.prepare(request, context).await?;
            backend.chat(request, context).await
        };

        tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => Err(LlmError::Cancelled),
            result = work => result,
        }
    }

    async fn chat_stream(&self, mut request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        request.stream = true;

        let work = async {
            let (backend, request) = self.prepare(request, context).await?;
            backend.chat_stream(request, context).await
        };

        tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => Err(LlmError::Cancelled),
            result = work => result,
        }
    }
}
