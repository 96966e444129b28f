//! Axon core library.
//!
//! Mediates between heterogeneous streaming LLM backends and a
//! conversational application: provider response fragments become a
//! canonical, ordered sequence of conversation events, each streaming
//! turn ends with exactly one terminal notification, and every message
//! is held as a model-facing / UI-facing record pair.

pub mod config;
pub mod history;
pub mod lifecycle;
pub mod message;
pub mod orchestrator;
pub mod segment;
pub mod store;
pub mod transport;

pub use config::{Config, ConfigError};
pub use history::{Conversion, HistoryError, LegacyEntry, UnifiedMessage, to_legacy, to_unified};
pub use lifecycle::{
    CompletionTracker, OfferOutcome, TerminalCandidate, TerminalReason, TerminalSource,
    TurnCompletionState, TurnDiagnostics,
};
pub use message::{
    CachedRender, ContentItem, LifecycleState, MessageContent, ModelMessage, Role, UiMessage,
};
pub use orchestrator::{
    NullObserver, OrchestratorError, StreamOrchestrator, TurnObserver, TurnOptions, TurnOutcome,
    TurnUpdate,
};
pub use segment::{ParseOutcome, ParseState, ParseSummary, Segment};
pub use store::MessageStore;
pub use transport::{
    FinishReason, ScriptedTransport, SseDialect, TransportError, TransportEvent, TransportStream,
    decode_sse,
};
