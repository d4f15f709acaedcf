//! Splits upstream byte streams into framed payloads.

use std::{collections::VecDeque, fmt, pin::Pin};

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt, stream};

use crate::error::LlmError;

/// Data payloads of a server-sent events stream. Events without data are skipped.
pub(crate) fn sse_frames<S, B, E>(bytes: S, provider: String) -> impl Stream<Item = crate::Result<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    bytes.eventsource().filter_map(move |event| {
        let item = match event {
            Ok(event) if event.data.is_empty() => None,
            Ok(event) => Some(Ok(event.data)),
            Err(EventStreamError::Transport(error)) => Some(Err(LlmError::unavailable(
                &provider,
                format!("stream interrupted: {error}"),
            ))),
            Err(error) => Some(Err(LlmError::StreamDecodeError(format!(
                "invalid event stream from '{provider}': {error}"
            )))),
        };

        std::future::ready(item)
    })
}

/// Buffers bytes until complete lines are available.
///
/// Partial lines, including partial UTF-8 sequences, stay buffered across pushes.
#[derive(Debug, Default)]
pub(crate) struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Appends `chunk` and returns every non-empty line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> crate::Result<Vec<String>> {
        self.buffer.extend_from_slice(chunk);

        let Some(end) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };

        let complete: Vec<u8> = self.buffer.drain(..=end).collect();
        let text = String::from_utf8(complete).map_err(|e| LlmError::StreamDecodeError(e.to_string()))?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// The trailing line of a stream that did not end with a newline.
    pub fn finish(&mut self) -> crate::Result<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8(rest).map_err(|e| LlmError::StreamDecodeError(e.to_string()))?;
        let text = text.trim();

        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

struct NdjsonState<S> {
    bytes: Pin<Box<S>>,
    framer: LineFramer,
    ready: VecDeque<String>,
    provider: String,
    finished: bool,
}

/// Lines of a newline-delimited JSON stream.
pub(crate) fn ndjson_frames<S, B, E>(bytes: S, provider: String) -> impl Stream<Item = crate::Result<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        framer: LineFramer::default(),
        ready: VecDeque::new(),
        provider,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }

            if state.finished {
                return None;
            }

            let result = match state.bytes.next().await {
                Some(Ok(chunk)) => state.framer.push(chunk.as_ref()),
                Some(Err(error)) => {
                    state.finished = true;
                    let error = LlmError::unavailable(&state.provider, format!("stream interrupted: {error}"));

                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    state.framer.finish().map(|line| line.into_iter().collect())
                }
            };

            match result {
                Ok(lines) => state.ready.extend(lines),
                Err(error) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
            }
        }
    })
}
