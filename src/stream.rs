//! Delta normalization for both upstream response shapes.
//!
//! Whatever the provider speaks, callers see the same thing: a channel of
//! plain-text deltas that closes when generation ends.
//!
//! - **Single-shot** bodies are parsed once by [`parse_single_shot`] and
//!   become one delta.
//! - **Event-stream** bodies are fed through [`SseDecoder`], which handles
//!   multi-byte characters and `data:` lines split across network reads.
//!
//! # Failure policy
//!
//! [`forward_event_stream`] never returns an error to its caller. A transport
//! fault becomes a final [`StreamError::marker`] delta, then the channel is
//! closed, so text already delivered is never lost. Frames that are not valid
//! JSON are skipped; partial frames at chunk boundaries are normal.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ProviderError, StreamError};
use crate::providers::Provider;

/// Receiving half of a delta stream.
pub type DeltaReceiver = mpsc::Receiver<String>;

/// Capacity of every delta channel: one decoded chunk in flight.
pub const DELTA_CHANNEL_CAPACITY: usize = 1;

const DATA_PREFIX: &str = "data: ";
const DONE_PAYLOAD: &str = "[DONE]";

/// Create a connected delta channel.
pub fn delta_channel() -> (mpsc::Sender<String>, DeltaReceiver) {
    mpsc::channel(DELTA_CHANNEL_CAPACITY)
}

/// A channel that yields exactly `deltas` and then closes.
pub fn ready_deltas(deltas: Vec<String>) -> DeltaReceiver {
    let (tx, rx) = mpsc::channel(deltas.len().max(1));
    for delta in deltas {
        // Capacity covers every delta, so this cannot fail.
        let _ = tx.try_send(delta);
    }
    rx
}

/// Stateful UTF-8 decoder that holds back incomplete trailing sequences.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping a trailing partial character for the next call.
    /// Invalid sequences become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
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

    /// Flush whatever is left once the input has ended.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Incremental SSE reader producing content deltas.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    line: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the deltas completed by this chunk, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(chunk);
        self.line.push_str(&text);

        let mut deltas = Vec::new();
        while let Some(end) = self.line.find('\n') {
            let line: String = self.line.drain(..=end).collect();
            if let Some(delta) = parse_sse_line(&line) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// End of input: process the final unterminated line, if any.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = self.utf8.finish();
        self.line.push_str(&tail);
        let line = std::mem::take(&mut self.line);
        parse_sse_line(&line).into_iter().collect()
    }
}

/// Content delta carried by one SSE line, if any.
///
/// Non-`data:` lines, `data: [DONE]`, unparseable payloads, and frames
/// without a non-empty `choices[0].delta.content` all yield `None`.
pub fn parse_sse_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches(&['\n', '\r'][..]);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload.trim() == DONE_PAYLOAD {
        return None;
    }

    let frame: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "discarding unparseable SSE frame");
            return None;
        }
    };

    frame
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Forward an SSE byte stream into `tx` as deltas, then close.
///
/// Transport errors become a trailing `stream error:` delta. If the receiver
/// goes away the read loop stops early.
pub async fn forward_event_stream<S, B, E>(stream: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    if let Err(err) = pump_event_stream(stream, &tx).await {
        tracing::warn!(error = %err, "event stream ended with an error");
        let _ = tx.send(err.marker()).await;
    }
}

/// Returns `Ok` on clean completion or when the consumer hung up.
async fn pump_event_stream<S, B, E>(
    stream: S,
    tx: &mpsc::Sender<String>,
) -> Result<(), StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(stream);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StreamError::new(e.to_string()))?;
        for delta in decoder.feed(chunk.as_ref()) {
            if tx.send(delta).await.is_err() {
                tracing::debug!("delta consumer dropped, aborting read loop");
                return Ok(());
            }
        }
    }

    for delta in decoder.finish() {
        if tx.send(delta).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Forward a plain-text byte stream (e.g. our own `/generate-report` body).
///
/// Same contract as [`forward_event_stream`], without SSE framing.
pub async fn forward_text_stream<S, E>(stream: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(stream);
    let mut decoder = Utf8Decoder::new();

    while let Some(chunk) = stream.next().await {
        let text = match chunk {
            Ok(bytes) => decoder.decode(&bytes),
            Err(e) => {
                let _ = tx.send(StreamError::new(e.to_string()).marker()).await;
                return;
            }
        };
        if !text.is_empty() && tx.send(text).await.is_err() {
            return;
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(rest).await;
    }
}

/// Extract the generated text from a single-shot chat-completions body.
///
/// Accepts the OpenAI shape (`choices[0].message.content`) and the Gemini
/// native shape (`candidates[0].content.parts[].text`). A top-level `error`
/// field is a provider-reported failure. A body with neither shape yields
/// empty text.
pub fn parse_single_shot(provider: Provider, body: &str) -> Result<String, ProviderError> {
    let json: Value = serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
        provider,
        message: e.to_string(),
    })?;

    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        return Err(ProviderError::Upstream {
            provider,
            message: error_message(err).unwrap_or_else(|| err.to_string()),
        });
    }

    if let Some(content) = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Ok(content.to_string());
    }

    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    Ok(parts
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default())
}

/// Human-readable message from an `error` value: a string, or `{message}`.
pub fn error_message(err: &Value) -> Option<String> {
    match err {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
