//! SSE decode adapters.
//!
//! Turns a raw SSE byte stream (for example a response body owned by
//! an HTTP layer) into canonical [`TransportEvent`]s. Two wire
//! dialects are understood. Both a finish-reason field and the
//! dialect's end-of-stream sentinel are surfaced as their own events;
//! collapsing redundant terminals is deliberately left to the
//! lifecycle tracker downstream.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{FinishReason, TransportError, TransportEvent, TransportStream};

/// Sentinel data frame ending an OpenAI-compatible stream.
pub(crate) const SSE_DONE_MARKER: &str = "[DONE]";

/// Which provider wire format the decoder expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SseDialect {
    /// Chat Completions chunks: `choices[0].delta.content`,
    /// `choices[0].finish_reason`, `[DONE]` sentinel.
    OpenAiCompat,
    /// Event-typed frames: `content_block_delta`, `message_delta`
    /// carrying `stop_reason`, `message_stop` sentinel.
    Anthropic,
}

impl Default for SseDialect {
    fn default() -> Self {
        SseDialect::OpenAiCompat
    }
}

impl std::str::FromStr for SseDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" | "openai-compat" => Ok(SseDialect::OpenAiCompat),
            "anthropic" | "claude" => Ok(SseDialect::Anthropic),
            other => Err(format!("unknown SSE dialect '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde types, private to the decoder
// ---------------------------------------------------------------------------

/// An OpenAI-compatible streaming chunk.
#[derive(Debug, Deserialize)]
struct OaiChunk {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    delta: OaiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaiDelta {
    #[serde(default)]
    content: Option<String>,
}

/// An event-typed frame, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
struct TypedFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    delta: Option<TypedDelta>,
}

#[derive(Debug, Deserialize)]
struct TypedDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Decode an SSE byte stream into transport events.
///
/// The input is any stream of byte buffers, split arbitrarily; frame
/// reassembly is handled here. Decoding stops at the dialect's
/// sentinel, at the first undecodable frame, or when the byte stream
/// ends. A stream that ends without a sentinel still yields
/// [`TransportEvent::Eos`] so a turn always sees a terminal signal.
pub fn decode_sse<S, B, E>(bytes: S, dialect: SseDialect) -> TransportStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    match dialect {
        SseDialect::OpenAiCompat => decode_openai_compat(bytes),
        SseDialect::Anthropic => decode_anthropic(bytes),
    }
}

fn decode_openai_compat<S, B, E>(bytes: S) -> TransportStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    Box::pin(async_stream::stream! {
        let mut frames = Box::pin(bytes.eventsource());

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(TransportError::Connection(e.to_string()));
                    return;
                }
            };

            if frame.data == SSE_DONE_MARKER {
                tracing::debug!("sse: end-of-stream sentinel");
                yield Ok(TransportEvent::Eos);
                return;
            }

            match serde_json::from_str::<OaiChunk>(&frame.data) {
                Ok(chunk) => {
                    if let Some(choice) = chunk.choices.first() {
                        if let Some(content) = &choice.delta.content
                            && !content.is_empty()
                        {
                            yield Ok(TransportEvent::Chunk(content.clone()));
                        }
                        if let Some(reason) = &choice.finish_reason {
                            tracing::debug!(reason, "sse: finish-reason frame");
                            yield Ok(TransportEvent::Finish(FinishReason::from_provider(reason)));
                        }
                    }
                }
                Err(e) => {
                    yield Err(TransportError::Decode(format!("bad chunk frame: {e}")));
                    return;
                }
            }
        }

        // Stream ended without [DONE]; still signal end of stream.
        tracing::debug!("sse: byte stream ended without sentinel");
        yield Ok(TransportEvent::Eos);
    })
}

fn decode_anthropic<S, B, E>(bytes: S) -> TransportStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    Box::pin(async_stream::stream! {
        let mut frames = Box::pin(bytes.eventsource());

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(TransportError::Connection(e.to_string()));
                    return;
                }
            };

            let typed = match serde_json::from_str::<TypedFrame>(&frame.data) {
                Ok(typed) => typed,
                Err(e) => {
                    yield Err(TransportError::Decode(format!("bad event frame: {e}")));
                    return;
                }
            };

            match typed.frame_type.as_str() {
                "content_block_delta" => {
                    if let Some(text) = typed.delta.and_then(|d| d.text)
                        && !text.is_empty()
                    {
                        yield Ok(TransportEvent::Chunk(text));
                    }
                }
                "message_delta" => {
                    if let Some(reason) = typed.delta.and_then(|d| d.stop_reason) {
                        tracing::debug!(reason, "sse: stop-reason frame");
                        yield Ok(TransportEvent::Finish(FinishReason::from_provider(&reason)));
                    }
                }
                "message_stop" => {
                    tracing::debug!("sse: message_stop sentinel");
                    yield Ok(TransportEvent::Eos);
                    return;
                }
                "error" => {
                    yield Err(TransportError::Connection(frame.data.clone()));
                    return;
                }
                // message_start, content_block_start/stop, ping
                _ => {}
            }
        }

        tracing::debug!("sse: byte stream ended without sentinel");
        yield Ok(TransportEvent::Eos);
    })
}
