//! Turns upstream push streams into one cancellable fragment stream.
//!
//! Every streaming call gets a worker task that reads framed payloads from the
//! transport, decodes them and pushes the fragments into a bounded queue. The
//! consumer side is a plain [`Stream`].

pub(crate) mod framing;

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::messages::{ChatResponse, ResponseFragment};

/// A live response. An `Err` item is the terminal error fragment.
pub type FragmentStream = Pin<Box<dyn Stream<Item = crate::Result<ResponseFragment>> + Send>>;

/// What a single upstream frame decoded into.
#[derive(Debug, PartialEq)]
pub(crate) enum Decoded {
    Fragment(ResponseFragment),
    /// Keep-alives, pings and events without content.
    Skip,
    /// The upstream signalled the end of the response.
    Done,
}

/// Vendor-specific decoding of one framed payload.
pub(crate) trait EventDecoder: Send + 'static {
    fn decode(&mut self, frame: &str) -> crate::Result<Decoded>;
}

/// Spawns the worker that feeds a fragment stream from upstream `frames`.
///
/// Delivery order is arrival order. An error, be it from the transport or from
/// decoding, is delivered once and closes the stream. Cancelling `cancellation`
/// or dropping the returned stream stops the worker and drops the transport.
pub(crate) fn spawn<F, D>(frames: F, mut decoder: D, cancellation: &CancellationToken, buffer: usize) -> FragmentStream
where
    F: Stream<Item = crate::Result<String>> + Send + 'static,
    D: EventDecoder,
{
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    let token = cancellation.child_token();
    let worker_token = token.clone();

    tokio::spawn(async move {
        let mut frames = std::pin::pin!(frames);

        loop {
            let next = tokio::select! {
                biased;
                _ = worker_token.cancelled() => break,
                next = frames.next() => next,
            };

            let item = match next {
                None => break,
                Some(Err(error)) => Err(error),
                Some(Ok(frame)) => match decoder.decode(&frame) {
                    Ok(Decoded::Fragment(fragment)) => Ok(fragment),
                    Ok(Decoded::Skip) => continue,
                    Ok(Decoded::Done) => break,
                    Err(error) => Err(error),
                },
            };

            let terminal = item.is_err();

            if let Err(ref error) = item {
                log::debug!("Closing stream after upstream error: {error}");
            }

            tokio::select! {
                biased;
                _ = worker_token.cancelled() => break,
                sent = sender.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }

            if terminal {
                break;
            }
        }
    });

    Box::pin(Fragments {
        receiver,
        token: token.clone(),
        _guard: token.drop_guard(),
    })
}

struct Fragments {
    receiver: mpsc::Receiver<crate::Result<ResponseFragment>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl Stream for Fragments {
    type Item = crate::Result<ResponseFragment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }

        self.receiver.poll_recv(cx)
    }
}

/// Drains a fragment stream into a complete response.
pub async fn collect(mut stream: FragmentStream) -> crate::Result<ChatResponse> {
    let mut response = ChatResponse::default();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;

        response.text.push_str(&fragment.text_delta);
        response.reasoning_text.push_str(&fragment.reasoning_delta);

        if let Some(reason) = fragment.finish_reason {
            response.finish_reason = reason;
        }

        if let Some(tokens) = fragment.input_tokens {
            response.input_tokens = tokens;
        }

        if let Some(tokens) = fragment.output_tokens {
            response.output_tokens = tokens;
        }
    }

    Ok(response)
}
