//! Streaming orchestrator.
//!
//! Glues a transport stream to the segment parser, the completion
//! tracker, and the message store: every chunk re-parses the turn's
//! accumulated text into message upserts, every terminal signal is
//! routed through the dedup machinery, and the caller's observer is
//! notified of progress and of exactly one terminal outcome per turn.


use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use uuid::Uuid;

use crate::config::Config;
use crate::lifecycle::{
    CompletionTracker, OfferOutcome, TerminalCandidate, TerminalReason, TerminalSource,
    TurnDiagnostics,
};
use crate::message::{
    ContentItem, LifecycleState, MessageContent, ModelMessage, Role, UiMessage,
};
use crate::segment::{self, ParseState, ParseSummary, Segment};
use crate::store::MessageStore;
use crate::transport::{TransportError, TransportEvent, TransportStream};

/// Errors surfaced by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A turn with this identifier is already streaming.
    #[error("turn {0} is already active")]
    TurnAlreadyActive(Uuid),

    /// The transport ended and even the injected sentinel produced no
    /// terminal event.
    #[error("turn {0} ended without a terminal event")]
    MissingTerminal(Uuid),
}

/// Provider metadata stamped onto the messages of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOptions {
    /// Provider name recorded on created messages.
    pub provider: String,
    /// Model name recorded on created messages.
    pub model_name: String,
}

impl TurnOptions {
    /// Create options with the given provider and model names.
    pub fn new(provider: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
        }
    }

    /// Options carrying the configured default provider and model.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.provider, &config.model)
    }
}

/// Incremental progress of a streaming turn, for live rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    /// New text was appended to the assistant message.
    TextAppended {
        /// The assistant message being streamed.
        message_id: Uuid,
        /// The newly appended text.
        text: String,
    },
    /// Previously shown output was reclassified (text turned out to be
    /// the start of markup); re-render the message from the store.
    ContentRevised {
        /// The assistant message being streamed.
        message_id: Uuid,
    },
    /// A tool invocation opened.
    ToolCallStarted {
        /// The assistant message being streamed.
        message_id: Uuid,
        /// Name of the invoked tool.
        tool_name: String,
    },
    /// An open invocation's payload grew.
    ToolCallUpdated {
        /// The assistant message being streamed.
        message_id: Uuid,
        /// Name of the invoked tool.
        tool_name: String,
        /// Payload captured so far.
        raw_payload: String,
    },
    /// An invocation's closing marker arrived.
    ToolCallCompleted {
        /// The assistant message being streamed.
        message_id: Uuid,
        /// Name of the invoked tool.
        tool_name: String,
        /// The full payload.
        raw_payload: String,
    },
}

/// The single terminal notification of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The turn that ended.
    pub turn_id: Uuid,
    /// Why it ended.
    pub reason: TerminalReason,
    /// The assistant message the turn produced.
    pub message_id: Uuid,
    /// Error or cancellation detail, when the reason is `Error`.
    pub detail: Option<String>,
    /// Suppression counters accumulated by the turn.
    pub diagnostics: TurnDiagnostics,
}

/// Receives streaming progress and the terminal outcome of a turn.
///
/// `on_terminal` is invoked exactly once per turn. Calls back into the
/// orchestrator from inside `on_terminal` (for example a cancellation)
/// are safe; any terminal candidate they raise is suppressed.
#[async_trait]
pub trait TurnObserver: Send + Sync {
    /// Delta-level progress.
    async fn on_update(&self, _update: TurnUpdate) {}

    /// The turn's terminal notification.
    async fn on_terminal(&self, _outcome: TurnOutcome) {}
}

/// An observer that ignores everything.
pub struct NullObserver;

#[async_trait]
impl TurnObserver for NullObserver {}

/// Per-turn streaming state.
#[derive(Debug)]
struct TurnState {
    /// Full text received this turn; every chunk re-parses it.
    accumulated: String,
    parse_state: ParseState,
    assistant_id: Uuid,
    options: TurnOptions,
    started_at: DateTime<Utc>,
    /// Previous pass, for diffing progress updates.
    prev_segments: Vec<Segment>,
    prev_summary: ParseSummary,
}

/// Drives streaming turns against the shared message store.
///
/// Chunks for one turn must be fed strictly in arrival order; distinct
/// turns may stream concurrently and share nothing but the store.
pub struct StreamOrchestrator {
    store: Arc<MessageStore>,
    tracker: CompletionTracker,
    turns: Mutex<HashMap<Uuid, TurnState>>,
}

impl StreamOrchestrator {
    /// Create an orchestrator over the given store.
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            store,
            tracker: CompletionTracker::new(),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// The shared message store.
    pub fn store(&self) -> Arc<MessageStore> {
        Arc::clone(&self.store)
    }

    /// Number of turns currently streaming.
    pub fn active_turns(&self) -> usize {
        self.lock_turns().len()
    }

    /// Abandon every in-flight turn without notifying observers. The
    /// message store is left untouched; clearing it is the caller's
    /// decision.
    pub fn reset(&self) {
        self.tracker.reset();
        self.lock_turns().clear();
        tracing::debug!("orchestrator: session reset");
    }

    /// Start a turn under a caller-supplied identifier.
    ///
    /// Creates the assistant message the turn will stream into (in the
    /// `Generating` state, visible, with a fresh identity) and returns
    /// that message's id.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TurnAlreadyActive`] when the
    /// identifier is already streaming.
    pub fn begin_turn(
        &self,
        turn_id: Uuid,
        options: TurnOptions,
    ) -> Result<Uuid, OrchestratorError> {
        let mut turns = self.lock_turns();
        if turns.contains_key(&turn_id) {
            return Err(OrchestratorError::TurnAlreadyActive(turn_id));
        }

        let assistant_id = Uuid::now_v7();
        let started_at = Utc::now();
        self.store.upsert_model_message(
            ModelMessage::assistant("")
                .with_id(assistant_id)
                .with_provider(&options.provider)
                .with_model_name(&options.model_name)
                .with_created_at(started_at),
        );
        self.store
            .upsert_ui_message(UiMessage::for_message(assistant_id));
        self.tracker.begin(turn_id);

        turns.insert(
            turn_id,
            TurnState {
                accumulated: String::new(),
                parse_state: ParseState::new(),
                assistant_id,
                options,
                started_at,
                prev_segments: Vec::new(),
                prev_summary: ParseSummary::default(),
            },
        );
        tracing::debug!(%turn_id, %assistant_id, "orchestrator: turn started");
        Ok(assistant_id)
    }

    /// Record a user submission in the store.
    pub fn push_user_message(&self, text: impl Into<String>, options: &TurnOptions) -> Uuid {
        let msg = ModelMessage::user(text.into())
            .with_provider(&options.provider)
            .with_model_name(&options.model_name);
        let id = msg.id;
        self.store.upsert_model_message(msg);
        self.store.upsert_ui_message(UiMessage::for_message(id));
        id
    }

    /// Record the result of an externally executed tool as a synthetic
    /// message.
    pub fn record_tool_result(
        &self,
        tool_name: impl Into<String>,
        output: impl Into<String>,
        options: &TurnOptions,
    ) -> Uuid {
        let mut msg = ModelMessage::user(MessageContent::Items(vec![ContentItem::ToolResult {
            tool_name: tool_name.into(),
            output: output.into(),
        }]))
        .with_provider(&options.provider)
        .with_model_name(&options.model_name)
        .synthetic();
        msg.is_user_submission = false;
        let id = msg.id;
        self.store.upsert_model_message(msg);

        let mut ui = UiMessage::for_message(id);
        ui.is_synthetic = true;
        self.store.upsert_ui_message(ui);
        id
    }

    /// Feed one transport event into a turn.
    ///
    /// Returns the turn's outcome when this event (after dedup) turned
    /// out to be terminal, `None` otherwise. Events for turns that
    /// already ended are dropped.
    pub async fn handle_event(
        &self,
        turn_id: Uuid,
        event: Result<TransportEvent, TransportError>,
        observer: &dyn TurnObserver,
    ) -> Option<TurnOutcome> {
        match event {
            Ok(TransportEvent::Chunk(text)) => {
                let (message_id, updates, candidate) = {
                    let mut turns = self.lock_turns();
                    let Some(turn) = turns.get_mut(&turn_id) else {
                        tracing::debug!(%turn_id, "orchestrator: chunk for inactive turn dropped");
                        return None;
                    };
                    let (updates, candidate) = self.apply_chunk(turn, &text);
                    (turn.assistant_id, updates, candidate)
                };

                for update in updates {
                    observer.on_update(update).await;
                }
                match candidate {
                    Some(candidate) => {
                        self.offer(turn_id, message_id, candidate, None, observer).await
                    }
                    None => None,
                }
            }
            Ok(TransportEvent::Finish(reason)) => {
                let message_id = self.assistant_of(turn_id)?;
                let candidate = TerminalCandidate {
                    reason: reason.terminal_reason(),
                    source: TerminalSource::Finish,
                };
                self.offer(turn_id, message_id, candidate, None, observer).await
            }
            Ok(TransportEvent::Eos) => {
                let message_id = self.assistant_of(turn_id)?;
                let candidate = TerminalCandidate {
                    reason: TerminalReason::Complete,
                    source: TerminalSource::Sentinel,
                };
                self.offer(turn_id, message_id, candidate, None, observer).await
            }
            Err(error) => {
                let message_id = self.assistant_of(turn_id)?;
                let candidate = TerminalCandidate {
                    reason: TerminalReason::Error,
                    source: TerminalSource::Fault,
                };
                self.offer(turn_id, message_id, candidate, Some(error.to_string()), observer)
                    .await
            }
        }
    }

    /// Cancel a streaming turn.
    ///
    /// Cancellation is an ordinary terminal candidate: it wins only if
    /// the turn has no terminal yet, and late transport signals after
    /// it are suppressed like any other duplicate.
    pub async fn cancel(
        &self,
        turn_id: Uuid,
        observer: &dyn TurnObserver,
    ) -> Option<TurnOutcome> {
        let message_id = self.assistant_of(turn_id)?;
        let candidate = TerminalCandidate {
            reason: TerminalReason::Error,
            source: TerminalSource::Cancelled,
        };
        self.offer(
            turn_id,
            message_id,
            candidate,
            Some("cancelled".to_string()),
            observer,
        )
        .await
    }

    /// Drive a whole turn from a transport stream.
    ///
    /// Consumes events until the turn's terminal event fires, then
    /// returns the outcome. A transport that ends silently still
    /// terminates the turn through an injected end-of-stream sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TurnAlreadyActive`] when the
    /// identifier is already streaming.
    pub async fn run_turn(
        &self,
        turn_id: Uuid,
        options: TurnOptions,
        mut transport: TransportStream,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, OrchestratorError> {
        self.begin_turn(turn_id, options)?;

        while let Some(event) = transport.next().await {
            if let Some(outcome) = self.handle_event(turn_id, event, observer).await {
                return Ok(outcome);
            }
        }

        match self
            .handle_event(turn_id, Ok(TransportEvent::Eos), observer)
            .await
        {
            Some(outcome) => Ok(outcome),
            None => Err(OrchestratorError::MissingTerminal(turn_id)),
        }
    }

    /// Append a chunk, re-parse, and mirror the result into the store.
    ///
    /// Runs under the turns lock; must not block or call the observer.
    fn apply_chunk(
        &self,
        turn: &mut TurnState,
        text: &str,
    ) -> (Vec<TurnUpdate>, Option<TerminalCandidate>) {
        turn.accumulated.push_str(text);
        let outcome = segment::parse(&turn.accumulated, &mut turn.parse_state);

        let updates = diff_updates(turn.assistant_id, &turn.prev_segments, &outcome.segments);

        self.store.upsert_model_message(ModelMessage {
            id: turn.assistant_id,
            role: Role::Assistant,
            content: content_from_segments(&outcome.segments),
            provider: turn.options.provider.clone(),
            model_name: turn.options.model_name.clone(),
            created_at: turn.started_at,
            lifecycle_state: LifecycleState::Generating,
            is_user_submission: false,
            is_synthetic: false,
        });

        let mut ui = self
            .store
            .get_ui(turn.assistant_id)
            .unwrap_or_else(|| UiMessage::for_message(turn.assistant_id));
        ui.is_calling = outcome.summary.partial_tool_count > 0;
        self.store.upsert_ui_message(ui);

        let candidate = if outcome.summary.completion_observed
            && !turn.prev_summary.completion_observed
        {
            Some(TerminalCandidate {
                reason: TerminalReason::ToolUse,
                source: TerminalSource::Parser { partial: false },
            })
        } else if outcome.summary.partial_tool_count > turn.prev_summary.partial_tool_count {
            // The open invocation announces itself; it can never win
            // the terminal slot.
            Some(TerminalCandidate {
                reason: TerminalReason::ToolUse,
                source: TerminalSource::Parser { partial: true },
            })
        } else {
            None
        };

        turn.prev_summary = outcome.summary;
        turn.prev_segments = outcome.segments;
        (updates, candidate)
    }

    /// Route a candidate through the dedup tracker and finalize when
    /// it wins.
    async fn offer(
        &self,
        turn_id: Uuid,
        message_id: Uuid,
        candidate: TerminalCandidate,
        detail: Option<String>,
        observer: &dyn TurnObserver,
    ) -> Option<TurnOutcome> {
        match self.tracker.offer(turn_id, candidate) {
            OfferOutcome::Forward(candidate) => {
                Some(self.finalize(turn_id, message_id, candidate, detail, observer).await)
            }
            OfferOutcome::PartialRejected
            | OfferOutcome::DuplicateSuppressed
            | OfferOutcome::TurnUnknown => None,
        }
    }

    /// Final store upserts, the exactly-once notification, and turn
    /// teardown.
    async fn finalize(
        &self,
        turn_id: Uuid,
        message_id: Uuid,
        candidate: TerminalCandidate,
        detail: Option<String>,
        observer: &dyn TurnObserver,
    ) -> TurnOutcome {
        if let Some(mut msg) = self.store.get_model(message_id) {
            msg.lifecycle_state = LifecycleState::Generated;
            self.store.upsert_model_message(msg);
        }
        if let Some(mut ui) = self.store.get_ui(message_id) {
            ui.is_calling = false;
            self.store.upsert_ui_message(ui);
        }

        let outcome = TurnOutcome {
            turn_id,
            reason: candidate.reason,
            message_id,
            detail,
            diagnostics: self.tracker.diagnostics(turn_id).unwrap_or_default(),
        };
        tracing::debug!(%turn_id, reason = ?candidate.reason, "orchestrator: turn terminal");

        // Nested candidates raised by the observer land while the
        // tracker still has completion in progress and are suppressed.
        observer.on_terminal(outcome.clone()).await;
        self.tracker.acknowledge(turn_id);

        let diagnostics = self
            .tracker
            .release(turn_id)
            .unwrap_or(outcome.diagnostics);
        self.lock_turns().remove(&turn_id);
        tracing::debug!(%turn_id, "orchestrator: turn released");

        TurnOutcome {
            diagnostics,
            ..outcome
        }
    }

    fn assistant_of(&self, turn_id: Uuid) -> Option<Uuid> {
        let turns = self.lock_turns();
        match turns.get(&turn_id) {
            Some(turn) => Some(turn.assistant_id),
            None => {
                tracing::debug!(%turn_id, "orchestrator: event for inactive turn dropped");
                None
            }
        }
    }

    fn lock_turns(&self) -> MutexGuard<'_, HashMap<Uuid, TurnState>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Convert a parse pass into message content: plain text when no
/// markup was involved, structured items otherwise.
fn content_from_segments(segments: &[Segment]) -> MessageContent {
    let has_tool = segments
        .iter()
        .any(|s| matches!(s, Segment::ToolInvocation { .. }));
    if !has_tool {
        let text: String = segments
            .iter()
            .map(|s| match s {
                Segment::Text { text } => text.as_str(),
                Segment::ToolInvocation { .. } => "",
            })
            .collect();
        MessageContent::Plain(text)
    } else {
        MessageContent::Items(
            segments
                .iter()
                .map(|s| match s {
                    Segment::Text { text } => ContentItem::Text { text: text.clone() },
                    Segment::ToolInvocation {
                        tool_name,
                        raw_payload,
                        complete,
                    } => ContentItem::ToolInvocation {
                        tool_name: tool_name.clone(),
                        raw_payload: raw_payload.clone(),
                        complete: *complete,
                    },
                })
                .collect(),
        )
    }
}

/// Compare two parse passes and describe what changed.
fn diff_updates(message_id: Uuid, prev: &[Segment], new: &[Segment]) -> Vec<TurnUpdate> {
    let mut updates = Vec::new();

    let prev_text = concat_text(prev);
    let new_text = concat_text(new);
    if new_text.starts_with(&prev_text) {
        if new_text.len() > prev_text.len() {
            updates.push(TurnUpdate::TextAppended {
                message_id,
                text: new_text[prev_text.len()..].to_string(),
            });
        }
    } else {
        updates.push(TurnUpdate::ContentRevised { message_id });
    }

    let prev_inv = invocations(prev);
    let new_inv = invocations(new);
    for (i, (tool_name, raw_payload, complete)) in new_inv.iter().enumerate() {
        match prev_inv.get(i) {
            None => {
                updates.push(TurnUpdate::ToolCallStarted {
                    message_id,
                    tool_name: tool_name.to_string(),
                });
                if *complete {
                    updates.push(TurnUpdate::ToolCallCompleted {
                        message_id,
                        tool_name: tool_name.to_string(),
                        raw_payload: raw_payload.to_string(),
                    });
                }
            }
            Some((_, prev_payload, prev_complete)) if !prev_complete => {
                if *complete {
                    updates.push(TurnUpdate::ToolCallCompleted {
                        message_id,
                        tool_name: tool_name.to_string(),
                        raw_payload: raw_payload.to_string(),
                    });
                } else if raw_payload != prev_payload {
                    updates.push(TurnUpdate::ToolCallUpdated {
                        message_id,
                        tool_name: tool_name.to_string(),
                        raw_payload: raw_payload.to_string(),
                    });
                }
            }
            Some(_) => {}
        }
    }
    updates
}

fn concat_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::Text { text } => Some(text.as_str()),
            Segment::ToolInvocation { .. } => None,
        })
        .collect()
}

fn invocations(segments: &[Segment]) -> Vec<(&str, &str, bool)> {
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::ToolInvocation {
                tool_name,
                raw_payload,
                complete,
            } => Some((tool_name.as_str(), raw_payload.as_str(), *complete)),
            Segment::Text { .. } => None,
        })
        .collect()
}
