//! Transport boundary types.
//!
//! The orchestrator consumes a stream of [`TransportEvent`]s and makes
//! no assumption about where they come from. [`sse`] decodes provider
//! SSE wire formats into that shape; [`scripted`] fabricates event
//! sequences for tests and offline replay.

pub mod scripted;
pub mod sse;

pub use scripted::ScriptedTransport;
pub use sse::{SseDialect, decode_sse};

use std::pin::Pin;

use futures::Stream;

use crate::lifecycle::TerminalReason;

/// Why a provider reported the generation finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal end of generation.
    Stop,
    /// The model stopped to call a tool.
    ToolUse,
    /// The token budget was exhausted.
    Length,
    /// A reason string this crate does not recognize.
    Other(String),
}

impl FinishReason {
    /// Map a provider's finish-reason string onto the canonical enum.
    ///
    /// Each backend spells these differently; unknown spellings are
    /// preserved in [`FinishReason::Other`].
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolUse,
            "length" | "max_tokens" => FinishReason::Length,
            other => FinishReason::Other(other.to_string()),
        }
    }

    /// The terminal reason this finish-reason implies for a turn.
    pub fn terminal_reason(&self) -> TerminalReason {
        match self {
            FinishReason::ToolUse => TerminalReason::ToolUse,
            _ => TerminalReason::Complete,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::ToolUse => write!(f, "tool_use"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// One event at the transport boundary.
///
/// A well-behaved transport yields any number of `Chunk`s followed by
/// exactly one terminal signal (`Finish`, `Eos`, or an `Err` item).
/// Nothing here enforces that; deduplication is the lifecycle
/// tracker's job.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A text delta.
    Chunk(String),
    /// The provider reported a finish-reason.
    Finish(FinishReason),
    /// The end-of-stream sentinel frame.
    Eos,
}

/// Errors surfaced by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A frame could not be decoded.
    #[error("stream decode failed: {0}")]
    Decode(String),

    /// The underlying connection failed.
    #[error("transport failed: {0}")]
    Connection(String),
}

/// The stream shape every transport hands to the orchestrator.
pub type TransportStream =
    Pin<Box<dyn Stream<Item = Result<TransportEvent, TransportError>> + Send>>;
