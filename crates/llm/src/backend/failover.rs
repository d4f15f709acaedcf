//! Primary/backup pair behind the backend contract.

use std::sync::Arc;

use async_trait::async_trait;
use context::RequestContext;

use super::Backend;
use crate::{
    error::LlmError,
    messages::{ChatRequest, ChatResponse},
    stream::FragmentStream,
};

/// Retries a call once on the backup when the main backend is missing or fails
/// before a response or stream handle exists.
///
/// Failures inside an established stream are never retried: the caller already
/// received part of the output.
pub struct Failover {
    name: String,
    main: Option<Arc<dyn Backend>>,
    backup: Option<Arc<dyn Backend>>,
}

enum Route<'a> {
    Main(&'a Arc<dyn Backend>),
    Backup(&'a Arc<dyn Backend>),
    MainThenBackup(&'a Arc<dyn Backend>, &'a Arc<dyn Backend>),
}

impl Failover {
    pub fn new(name: impl Into<String>, main: Option<Arc<dyn Backend>>, backup: Option<Arc<dyn Backend>>) -> Self {
        Self {
            name: name.into(),
            main,
            backup,
        }
    }

    fn route(&self, context: &RequestContext) -> crate::Result<Route<'_>> {
        match (&self.main, &self.backup) {
            (_, Some(backup)) if context.prefer_backup => Ok(Route::Backup(backup)),
            (Some(main), Some(backup)) => Ok(Route::MainThenBackup(main, backup)),
            (Some(main), None) => Ok(Route::Main(main)),
            (None, Some(backup)) => {
                log::warn!("Main backend of '{}' is not available, using its backup", self.name);
                Ok(Route::Backup(backup))
            }
            (None, None) => Err(LlmError::unavailable(&self.name, "no backend is configured")),
        }
    }

    fn should_retry(&self, main: &dyn Backend, error: &LlmError) -> bool {
        if matches!(error, LlmError::Cancelled) {
            return false;
        }

        log::warn!(
            "Backend '{}' of '{}' failed ({}), retrying on the backup: {error}",
            main.name(),
            self.name,
            error.code()
        );

        true
    }
}

#[async_trait]
impl Backend for Failover {
    async fn chat(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        match self.route(context)? {
            Route::Main(backend) | Route::Backup(backend) => backend.chat(request, context).await,
            Route::MainThenBackup(main, backup) => match main.chat(request.clone(), context).await {
                Err(error) if self.should_retry(&**main, &error) => backup.chat(request, context).await,
                result => result,
            },
        }
    }

    async fn chat_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        match self.route(context)? {
            Route::Main(backend) | Route::Backup(backend) => backend.chat_stream(request, context).await,
            Route::MainThenBackup(main, backup) => match main.chat_stream(request.clone(), context).await {
                Err(error) if self.should_retry(&**main, &error) => backup.chat_stream(request, context).await,
                result => result,
            },
        }
    }

    fn max_context_length(&self, model: &str) -> usize {
        let main = self.main.as_ref().map(|b| b.max_context_length(model));
        let backup = self.backup.as_ref().map(|b| b.max_context_length(model));

        // Either side may end up serving the request.
        match (main, backup) {
            (Some(main), Some(backup)) => main.min(backup),
            (Some(length), None) | (None, Some(length)) => length,
            (None, None) => 0,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
