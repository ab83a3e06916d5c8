//! Turn raw provider chunks into cumulative display text.
//!
//! Every streaming provider declares one [`ChunkAdapter`]. Delta and snapshot
//! adapters first strip the wire [`Framing`], then merge the payload into the
//! text seen so far. Custom providers already emit complete display text per
//! chunk and skip both steps.

use crate::Error;

/// How raw chunks are wrapped on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// The chunk is the payload.
    Plain,
    /// Only `data: `-prefixed lines carry payload; `[DONE]` and other lines are dropped.
    DataLines,
    /// The chunk is a JSON envelope; the payload is the string at this JSON pointer.
    Json(String),
    /// `data: ` lines holding JSON envelopes.
    DataLinesJson(String),
}

/// Closed set of chunk shapes a streaming provider can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAdapter {
    /// Each payload is new text to append.
    Delta(Framing),
    /// Each payload is the whole answer so far.
    Snapshot(Framing),
    /// The provider yields finished cumulative text; chunks bypass normalization.
    Custom,
}

impl ChunkAdapter {
    pub fn is_custom(&self) -> bool {
        matches!(self, ChunkAdapter::Custom)
    }
}

impl Framing {
    /// Extract the payload from a raw chunk. `Ok(None)` means the chunk
    /// carried framing only.
    pub fn unwrap_payload(&self, raw: &str) -> Result<Option<String>, Error> {
        match self {
            Framing::Plain => Ok(Some(raw.to_string())),
            Framing::DataLines => join_payloads(data_lines(raw).map(|d| Ok(Some(d.to_string())))),
            Framing::Json(pointer) => json_payload(raw, pointer),
            Framing::DataLinesJson(pointer) => {
                join_payloads(data_lines(raw).map(|d| json_payload(d, pointer)))
            }
        }
    }
}

/// Payloads of the `data: ` lines in a chunk, minus end-of-stream sentinels.
fn data_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| data.trim() != "[DONE]")
}

fn join_payloads(
    parts: impl Iterator<Item = Result<Option<String>, Error>>,
) -> Result<Option<String>, Error> {
    let mut joined: Option<String> = None;
    for part in parts {
        if let Some(text) = part? {
            joined.get_or_insert_with(String::new).push_str(&text);
        }
    }
    Ok(joined)
}

fn json_payload(raw: &str, pointer: &str) -> Result<Option<String>, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| Error::streaming(format!("Malformed JSON chunk: {e}")))?;
    Ok(value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

/// Merge one unwrapped payload into the prior cumulative text.
///
/// Snapshot merging is idempotent: replaying a snapshot that is already
/// contained in `prior` leaves it unchanged.
pub fn merge(adapter: &ChunkAdapter, prior: &str, payload: &str) -> String {
    match adapter {
        ChunkAdapter::Delta(_) => {
            let mut text = String::with_capacity(prior.len() + payload.len());
            text.push_str(prior);
            text.push_str(payload);
            text
        }
        ChunkAdapter::Snapshot(_) => {
            if prior.starts_with(payload) {
                prior.to_string()
            } else {
                payload.to_string()
            }
        }
        ChunkAdapter::Custom => payload.to_string(),
    }
}

/// Single entry point: apply one raw chunk to the prior cumulative text.
/// Returns `Ok(None)` when the chunk held no payload.
pub fn normalize(adapter: &ChunkAdapter, prior: &str, raw: &str) -> Result<Option<String>, Error> {
    let payload = match adapter {
        ChunkAdapter::Delta(framing) | ChunkAdapter::Snapshot(framing) => {
            framing.unwrap_payload(raw)?
        }
        ChunkAdapter::Custom => Some(raw.to_string()),
    };
    Ok(payload.map(|p| merge(adapter, prior, &p)))
}

/// Stateful wrapper that tracks cumulative text across one generation.
#[derive(Debug)]
pub struct StreamNormalizer {
    adapter: ChunkAdapter,
    text: String,
}

impl StreamNormalizer {
    pub fn new(adapter: ChunkAdapter) -> Self {
        Self {
            adapter,
            text: String::new(),
        }
    }

    /// Apply a raw chunk. Returns the new cumulative text when the chunk carried payload.
    pub fn push(&mut self, raw: &str) -> Result<Option<&str>, Error> {
        match normalize(&self.adapter, &self.text, raw)? {
            Some(text) => {
                self.text = text;
                Ok(Some(&self.text))
            }
            None => Ok(None),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
