mod stream;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use context::RequestContext;
use fastrace::{Span, future::FutureExt, prelude::LocalSpan};
use fastrace_futures::StreamExt as FastraceStreamExt;
use itertools::Itertools;

use self::stream::TracingStream;
use super::ChatService;
use crate::{
    messages::{ChatRequest, ChatResponse},
    stream::FragmentStream,
};

/// Wrapper that adds tracing to engine operations
pub(crate) struct EngineWithTracing<S> {
    inner: S,
}

impl<S> EngineWithTracing<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn request_span(name: &'static str, request: &ChatRequest, context: &RequestContext) -> Span {
    let span = Span::enter_with_local_parent(name);

    span.add_property(|| ("gen_ai.request.model", request.model.clone()));

    if request.max_tokens > 0 {
        span.add_property(|| ("gen_ai.request.max_tokens", request.max_tokens.to_string()));
    }

    if request.temperature > 0.0 {
        span.add_property(|| ("gen_ai.request.temperature", request.temperature.to_string()));
    }

    if !request.flags.is_empty() {
        span.add_property(|| ("llm.flags", request.flags.iter().join(",")));
    }

    if let Some(ref client_identity) = context.client_identity {
        span.add_property(|| ("client.id", client_identity.client_id.clone()));

        if let Some(ref group) = client_identity.group {
            span.add_property(|| ("client.group", group.clone()));
        }
    }

    span.add_property(|| ("llm.prefer_backup", context.prefer_backup.to_string()));

    span
}

impl<S> ChatService for EngineWithTracing<S>
where
    S: ChatService,
{
    async fn chat(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResponse> {
        let span = request_span("llm:chat", &request, context);

        let fut = async move {
            let result = self.inner.chat(request, context).await;

            match &result {
                Ok(response) => {
                    LocalSpan::add_property(|| ("gen_ai.usage.input_tokens", response.input_tokens.to_string()));
                    LocalSpan::add_property(|| ("gen_ai.usage.output_tokens", response.output_tokens.to_string()));
                    LocalSpan::add_property(|| ("gen_ai.response.finish_reason", response.finish_reason.to_string()));
                }
                Err(e) => {
                    LocalSpan::add_property(|| ("error", "true"));
                    LocalSpan::add_property(|| ("error.type", e.code()));
                }
            }

            result
        };

        fut.in_span(span).await
    }

    async fn chat_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<FragmentStream> {
        let span = request_span("llm:chat_stream", &request, context);
        span.add_property(|| ("llm.stream", "true"));

        let (result, span) = InSpanAndOut::new(self.inner.chat_stream(request, context), span).await;

        match result {
            // The span stays open until the consumer is done with the stream.
            Ok(stream) => Ok(Box::pin(TracingStream::new(stream).in_span(span)) as FragmentStream),
            Err(e) => {
                span.add_property(|| ("error", "true"));
                span.add_property(|| ("error.type", e.code()));

                Err(e)
            }
        }
    }
}

/// Polls a future inside `span` and hands the span back with the output.
#[pin_project::pin_project]
struct InSpanAndOut<F> {
    #[pin]
    inner: F,
    span: Option<Span>,
}

impl<F> InSpanAndOut<F> {
    fn new(inner: F, span: Span) -> Self {
        Self { inner, span: Some(span) }
    }
}

impl<F: Future> Future for InSpanAndOut<F> {
    type Output = (F::Output, Span);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let _guard = this.span.as_ref().map(|s| s.set_local_parent());

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => Poll::Ready((output, this.span.take().unwrap_or_else(Span::noop))),
        }
    }
}
