//! SSE stream decoder for Venice chat completions.
//!
//! Turns an arbitrarily chunked byte stream of `data: …` lines into a lazy
//! sequence of text fragments. Frames are not aligned with network reads, so
//! the decoder keeps a running line buffer plus any incomplete UTF-8 sequence
//! between reads.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use super::errors::VeniceError;
use super::types::ChatCompletionChunk;

/// Prefix of every data line.
const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream.
const DONE_SENTINEL: &str = "[DONE]";

/// How much of a malformed frame is echoed into the log.
const LOG_PREVIEW_CHARS: usize = 100;

// ─── Incremental UTF-8 ───────────────────────────────────────────────────────

/// Stateful UTF-8 decoder: a multi-byte character split across two reads
/// decodes once its remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }

        out
    }

    /// End of input: a dangling partial sequence becomes one U+FFFD.
    fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

// ─── SSE decoder ─────────────────────────────────────────────────────────────

/// Result of processing one complete line.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Fragment(String),
    Skip,
    Done,
}

/// Line-oriented SSE decoder for a single stream.
///
/// Feed it raw bytes in arrival order; it returns the fragments completed by
/// each read. After the `[DONE]` sentinel every later byte is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    done: bool,
    malformed_frames: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of data frames skipped because their JSON did not parse.
    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }

    /// Append one read's worth of bytes and return the fragments of every
    /// line it completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.push_str(&self.utf8.decode(bytes));

        // Complete lines are consumed by offset; the buffer shifts once per read.
        let mut fragments = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = buffer[consumed..].find('\n') {
            let line_end = consumed + offset;
            let outcome = self.process_line(&buffer[consumed..line_end]);
            consumed = line_end + 1;
            match outcome {
                LineOutcome::Fragment(f) => fragments.push(f),
                LineOutcome::Skip => {}
                LineOutcome::Done => {
                    self.finish_done();
                    return fragments;
                }
            }
        }

        buffer.drain(..consumed);
        self.buffer = buffer;
        fragments
    }

    /// End of the byte source: the residual buffer is processed as one final
    /// line (covers a last frame without a trailing newline).
    pub fn finish(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let residual = std::mem::take(&mut self.buffer);

        match self.process_line(&residual) {
            LineOutcome::Fragment(f) => vec![f],
            LineOutcome::Done => {
                self.finish_done();
                Vec::new()
            }
            LineOutcome::Skip => Vec::new(),
        }
    }

    fn finish_done(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.utf8.pending.clear();
    }

    fn process_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Skip;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Skip;
        };
        if payload == DONE_SENTINEL {
            return LineOutcome::Done;
        }

        match serde_json::from_str::<ChatCompletionChunk>(payload) {
            Ok(chunk) => match chunk.content() {
                Some(content) => LineOutcome::Fragment(content.to_string()),
                None => LineOutcome::Skip,
            },
            Err(e) => {
                self.malformed_frames += 1;
                let preview: String = payload.chars().take(LOG_PREVIEW_CHARS).collect();
                tracing::warn!(error = %e, data = %preview, "could not parse SSE data frame");
                LineOutcome::Skip
            }
        }
    }
}

// ─── Stream adapter ──────────────────────────────────────────────────────────

struct DecodeState<S> {
    source: Option<Pin<Box<S>>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

/// Decode an SSE byte stream into text fragments.
///
/// Pull-based: the next read from `byte_stream` happens only once every
/// fragment from earlier reads has been taken by the consumer. Dropping the
/// returned stream drops `byte_stream` (for a `reqwest` body, that releases
/// the connection). The source is also dropped as soon as `[DONE]` arrives.
///
/// A read error yields one `VeniceError::StreamError` and ends the sequence.
/// Malformed frames are skipped and logged, never surfaced.
pub fn decode_sse_stream<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, VeniceError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = DecodeState {
        source: Some(Box::pin(byte_stream)),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.ready.pop_front() {
                return Some((Ok(fragment), state));
            }

            let source = state.source.as_mut()?;

            match source.next().await {
                Some(Ok(bytes)) => {
                    state.ready.extend(state.decoder.feed(bytes.as_ref()));
                    if state.decoder.is_done() {
                        tracing::debug!("received [DONE], closing byte stream");
                        state.source = None;
                    }
                }
                Some(Err(e)) => {
                    state.source = None;
                    return Some((
                        Err(VeniceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    state.ready.extend(state.decoder.finish());
                    state.source = None;
                    tracing::debug!(
                        malformed_frames = state.decoder.malformed_frames(),
                        "byte stream ended"
                    );
                }
            }
        }
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
