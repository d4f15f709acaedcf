use std::{
    pin::Pin,
    task::{Context, Poll},
};

use fastrace::prelude::LocalSpan;
use futures::Stream;

use crate::{messages::ResponseFragment, stream::FragmentStream};

/// Records finish reason, usage and errors on the active span as fragments flow through.
pub(super) struct TracingStream {
    inner: FragmentStream,
    finish_reason_recorded: bool,
    input_recorded: bool,
    output_recorded: bool,
    fragments: usize,
}

impl TracingStream {
    pub(super) fn new(inner: FragmentStream) -> Self {
        Self {
            inner,
            finish_reason_recorded: false,
            input_recorded: false,
            output_recorded: false,
            fragments: 0,
        }
    }
}

impl Stream for TracingStream {
    type Item = crate::Result<ResponseFragment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll_result = self.inner.as_mut().poll_next(cx);

        match &poll_result {
            Poll::Ready(Some(Ok(fragment))) => {
                self.fragments += 1;

                if !self.finish_reason_recorded
                    && let Some(ref finish_reason) = fragment.finish_reason
                {
                    LocalSpan::add_property(|| ("gen_ai.response.finish_reason", finish_reason.to_string()));
                    self.finish_reason_recorded = true;
                }

                if !self.input_recorded
                    && let Some(tokens) = fragment.input_tokens
                {
                    LocalSpan::add_property(|| ("gen_ai.usage.input_tokens", tokens.to_string()));
                    self.input_recorded = true;
                }

                if !self.output_recorded
                    && let Some(tokens) = fragment.output_tokens
                {
                    LocalSpan::add_property(|| ("gen_ai.usage.output_tokens", tokens.to_string()));
                    self.output_recorded = true;
                }
            }
            Poll::Ready(Some(Err(e))) => {
                LocalSpan::add_property(|| ("error", "true"));
                LocalSpan::add_property(|| ("error.type", e.code()));
            }
            Poll::Ready(None) => {
                let fragments = self.fragments;
                LocalSpan::add_property(|| ("llm.stream.fragments", fragments.to_string()));
            }
            Poll::Pending => {}
        }

        poll_result
    }
}
