//! Stream adapters that cut HTTP byte streams into frames.
//!
//! [`SseStream`] yields server-sent events (blank-line delimited) and
//! [`LineStream`] yields raw newline-delimited lines, which is what token
//! streams, NDJSON bodies and `data: `-prefixed line protocols look like on
//! the wire. Both keep partial frames (and partial UTF-8 sequences) buffered
//! across chunk boundaries.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Upper bound on buffered bytes without a frame separator.
const MAX_BUFFER: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type (optional).
    pub event_type: Option<String>,
    /// Event data.
    pub data: String,
    /// Event ID (optional).
    pub id: Option<String>,
}

impl SseEvent {
    /// Create a new SSE event with just data.
    pub fn new(data: String) -> Self {
        Self {
            event_type: None,
            data,
            id: None,
        }
    }

    /// Check if this is a "done" sentinel (OpenAI-style end of stream).
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    /// Parse a single complete SSE event from its text representation.
    fn parse(event_text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;

        for line in event_text.lines() {
            // Only trim the end to preserve intentional leading spaces
            let line = line.trim_end();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    "id" => id = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
        })
    }
}

/// Byte buffer that hands out complete, UTF-8 checked frames.
#[derive(Debug, Default)]
struct FrameBuffer {
    bytes: Vec<u8>,
    /// Rewrite CRLF and lone CR line endings to LF as bytes arrive.
    normalize_eol: bool,
    /// The last byte seen was CR, so an LF right after it is dropped.
    after_cr: bool,
}

impl FrameBuffer {
    fn normalizing() -> Self {
        Self {
            normalize_eol: true,
            ..Self::default()
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.normalize_eol {
            self.bytes.reserve(chunk.len());
            for &byte in chunk {
                match byte {
                    b'\n' if self.after_cr => {}
                    b'\r' => self.bytes.push(b'\n'),
                    _ => self.bytes.push(byte),
                }
                self.after_cr = byte == b'\r';
            }
        } else {
            self.bytes.extend_from_slice(chunk);
        }
        if self.bytes.len() > MAX_BUFFER {
            self.bytes.clear();
            return Err(Error::streaming("stream buffer exceeded maximum size"));
        }
        Ok(())
    }

    /// Drain every complete frame ending in `separator`.
    fn drain_frames(&mut self, separator: &[u8]) -> Result<Vec<String>, Error> {
        let finder = memmem::Finder::new(separator);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(pos) = finder.find(&self.bytes[start..]) {
            let end = start + pos;
            let text = std::str::from_utf8(&self.bytes[start..end])
                .map_err(|e| Error::streaming(format!("Invalid UTF-8 in stream frame: {e}")))?;
            frames.push(text.to_string());
            start = end + separator.len();
        }

        if start > 0 {
            self.bytes.drain(..start);
        }
        Ok(frames)
    }

    /// Whatever is left once the upstream ends, if it is non-blank text.
    fn take_rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.bytes);
        let text = String::from_utf8(rest).ok()?;
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn upstream_error<E>(e: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::streaming(format!("Stream error: {}", e.into()))
}

/// A stream adapter that parses SSE events from a byte stream.
///
/// Events may be delimited with LF, CRLF or CR line endings.
pub struct SseStream<S> {
    inner: S,
    buffer: FrameBuffer,
    events: VecDeque<SseEvent>,
    finished: bool,
}

impl<S> SseStream<S> {
    /// Create a new SSE stream from a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: FrameBuffer::normalizing(),
            events: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Poll::Ready(Some(Err(upstream_error(e)))),
                None => {
                    self.finished = true;
                    // Upstreams may end without the final blank line
                    let last = self.buffer.take_rest().and_then(|t| SseEvent::parse(t.trim()));
                    return Poll::Ready(last.map(Ok));
                }
            };

            let this = &mut *self;
            let frames = this
                .buffer
                .push(&chunk)
                .and_then(|_| this.buffer.drain_frames(b"\n\n"));
            match frames {
                Ok(frames) => this.events.extend(frames.iter().filter_map(|f| SseEvent::parse(f))),
                Err(e) => return Poll::Ready(Some(Err(e))),
            }
        }
    }
}

/// A stream adapter that yields non-blank lines from a byte stream.
pub struct LineStream<S> {
    inner: S,
    buffer: FrameBuffer,
    lines: VecDeque<String>,
    finished: bool,
}

impl<S> LineStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: FrameBuffer::default(),
            lines: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Poll::Ready(Some(Err(upstream_error(e)))),
                None => {
                    self.finished = true;
                    let last = self.buffer.take_rest().map(|t| t.trim_end().to_string());
                    return Poll::Ready(last.map(Ok));
                }
            };

            let this = &mut *self;
            let frames = this
                .buffer
                .push(&chunk)
                .and_then(|_| this.buffer.drain_frames(b"\n"));
            match frames {
                Ok(frames) => this.lines.extend(
                    frames
                        .into_iter()
                        .map(|l| l.trim_end_matches('\r').to_string())
                        .filter(|l| !l.trim().is_empty()),
                ),
                Err(e) => return Poll::Ready(Some(Err(e))),
            }
        }
    }
}

/// Extension trait to add framing to byte streams.
pub trait FramedStreamExt: Stream {
    /// Parse this byte stream as SSE events.
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }

    /// Split this byte stream into lines.
    fn lines(self) -> LineStream<Self>
    where
        Self: Sized,
    {
        LineStream::new(self)
    }
}

impl<S: Stream> FramedStreamExt for S {}
