//! SSE stream aggregation module.
//!
//! Provides [`SseAggregator`] for line-buffered extraction of
//! `choices[0].delta.content` fragments from OpenAI-compatible SSE
//! streaming responses. Handles TCP chunk boundary reassembly correctly.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::types::StreamChunk;

/// A single unterminated line may not grow past this many bytes.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A `data:` payload that could not be decoded as a stream chunk.
#[derive(Debug, thiserror::Error)]
#[error("Malformed SSE frame ({source}): {payload}")]
pub struct StreamDecodeError {
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

/// Result of aggregating an SSE stream to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedStream {
    /// All content fragments, concatenated in arrival order.
    pub content: String,
    /// Number of non-empty content fragments appended.
    pub fragments: usize,
    /// Number of `data:` frames skipped because they failed to decode.
    pub decode_errors: usize,
    /// Whether `data: [DONE]` was received.
    pub done_received: bool,
}

/// Reduces a chunked SSE byte stream to one answer string.
///
/// Buffers raw bytes across chunk boundaries, reassembles complete lines,
/// and appends delta content from `data:` lines. The aggregator is consumed
/// by [`finish`](Self::finish), so a stream can only be reduced once.
#[derive(Debug, Default)]
pub struct SseAggregator {
    buffer: Vec<u8>,
    result: AggregatedStream,
}

impl SseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk of bytes from the SSE stream.
    pub fn process_chunk(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_raw_line(&line[..pos]);
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeds buffer cap, discarding"
            );
            self.buffer.clear();
        }
    }

    fn process_raw_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        self.process_line(line.trim());
    }

    /// Process a single complete SSE line.
    ///
    /// Anything but a `data:` line is ignored. `[DONE]` is noted but does not
    /// stop aggregation, since some upstreams keep sending after it.
    pub fn process_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();

        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.result.done_received = true;
            return;
        }

        if let Err(e) = self.process_data(data) {
            tracing::warn!(error = %e.source, payload = %e.payload, "Skipping malformed SSE frame");
            self.result.decode_errors += 1;
        }
    }

    /// Process the data payload of a `data:` SSE line.
    fn process_data(&mut self, data: &str) -> Result<(), StreamDecodeError> {
        let chunk: StreamChunk =
            serde_json::from_str(data).map_err(|source| StreamDecodeError {
                payload: data.to_string(),
                source,
            })?;

        if let Some(content) = chunk.first_delta_content() {
            if !content.is_empty() {
                self.result.content.push_str(content);
                self.result.fragments += 1;
            }
        }
        Ok(())
    }

    /// Consume the aggregator and produce the final result.
    ///
    /// Any bytes left without a trailing newline are processed as a last line.
    pub fn finish(mut self) -> AggregatedStream {
        if !self.buffer.is_empty() {
            let remaining = std::mem::take(&mut self.buffer);
            self.process_raw_line(&remaining);
        }
        self.result
    }
}

/// Drive a byte stream through a fresh [`SseAggregator`] until it ends.
///
/// The first transport error aborts aggregation and is returned as is.
pub async fn aggregate_stream<S, E>(stream: S) -> Result<AggregatedStream, E>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut aggregator = SseAggregator::new();

    while let Some(chunk) = stream.next().await {
        aggregator.process_chunk(&chunk?);
    }

    Ok(aggregator.finish())
}
