//! Per-turn completion tracking and terminal-event dedup.
//!
//! Every way a streaming turn can end (a closed tool tag, a transport
//! finish-reason, an end-of-stream sentinel, a transport fault, a
//! caller cancellation) is funnelled through one abstraction: a
//! [`TerminalCandidate`] offered to the [`CompletionTracker`]. The
//! tracker guarantees that exactly one candidate per turn is forwarded
//! to the caller; everything else is counted and dropped.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalReason {
    /// The turn ended on a completed tool invocation.
    ToolUse,
    /// The turn ended normally with text output.
    Complete,
    /// The turn ended on a transport fault or cancellation.
    Error,
}

/// Which code path produced a terminal candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSource {
    /// The segment parser. `partial` is true when the signal came from
    /// an invocation whose closing marker has not arrived; such a
    /// candidate never terminates a turn.
    Parser {
        /// Whether the invocation behind this signal is still open.
        partial: bool,
    },
    /// A transport-level finish-reason.
    Finish,
    /// The transport's end-of-stream sentinel frame.
    Sentinel,
    /// A transport fault.
    Fault,
    /// A caller-initiated cancellation.
    Cancelled,
}

/// A candidate terminal event for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCandidate {
    /// Why the turn would end.
    pub reason: TerminalReason,
    /// Where the signal came from.
    pub source: TerminalSource,
}

/// Completion state of one in-flight turn.
///
/// The phase is implied by the fields: `Idle` while `terminal_reason`
/// is `None`, `AwaitingTerminal` while a reason is set and
/// `completion_in_progress` is true, `TerminalDispatched` once the
/// forwarded event has been acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnCompletionState {
    /// The reason already forwarded to the caller, if any. Set at most
    /// once per turn.
    pub terminal_reason: Option<TerminalReason>,
    /// True while the forwarded event is being handled by the caller.
    /// Candidates arriving in this window come from nested callbacks
    /// and are suppressed.
    pub completion_in_progress: bool,
    /// Candidates dropped after the terminal was decided.
    pub suppressed_duplicates: u32,
    /// Parser candidates rejected because their invocation was still
    /// open.
    pub rejected_partials: u32,
}

/// Suppression counters for one turn, surfaced for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnDiagnostics {
    /// Candidates dropped after the terminal was decided.
    pub suppressed_duplicates: u32,
    /// Partial-invocation candidates that never qualified.
    pub rejected_partials: u32,
}

/// What [`CompletionTracker::offer`] decided about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// The candidate is the turn's terminal event; forward it to the
    /// caller, then call [`CompletionTracker::acknowledge`].
    Forward(TerminalCandidate),
    /// The candidate came from a still-open invocation and can never
    /// end a turn.
    PartialRejected,
    /// The turn already has a terminal event.
    DuplicateSuppressed,
    /// No state is held for this turn (never begun, or already
    /// released); the candidate is dropped.
    TurnUnknown,
}

/// Tracks completion state for every in-flight turn.
///
/// Keys are caller-supplied, opaque turn identifiers. State is held
/// from [`begin`](CompletionTracker::begin) until
/// [`release`](CompletionTracker::release) or a whole-session
/// [`reset`](CompletionTracker::reset).
#[derive(Debug, Default)]
pub struct CompletionTracker {
    turns: Mutex<HashMap<Uuid, TurnCompletionState>>,
}

impl CompletionTracker {
    /// Create a tracker with no in-flight turns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a turn. Any stale state under the same
    /// identifier is discarded.
    pub fn begin(&self, turn_id: Uuid) {
        self.lock().insert(turn_id, TurnCompletionState::default());
    }

    /// Offer a candidate terminal event for a turn.
    ///
    /// At most one candidate per turn is ever answered with
    /// [`OfferOutcome::Forward`]; every later candidate is counted and
    /// dropped. A candidate from a still-open invocation is rejected
    /// outright and does not consume the turn's terminal slot.
    pub fn offer(&self, turn_id: Uuid, candidate: TerminalCandidate) -> OfferOutcome {
        let mut turns = self.lock();
        let Some(state) = turns.get_mut(&turn_id) else {
            tracing::debug!(%turn_id, ?candidate, "lifecycle: candidate for unknown turn dropped");
            return OfferOutcome::TurnUnknown;
        };

        if let TerminalSource::Parser { partial: true } = candidate.source {
            state.rejected_partials += 1;
            tracing::debug!(
                %turn_id,
                "lifecycle: open invocation cannot terminate the turn"
            );
            return OfferOutcome::PartialRejected;
        }

        if state.terminal_reason.is_some() {
            state.suppressed_duplicates += 1;
            tracing::debug!(
                %turn_id,
                reason = ?candidate.reason,
                source = ?candidate.source,
                in_progress = state.completion_in_progress,
                "lifecycle: duplicate terminal suppressed"
            );
            return OfferOutcome::DuplicateSuppressed;
        }

        state.terminal_reason = Some(candidate.reason);
        state.completion_in_progress = true;
        OfferOutcome::Forward(candidate)
    }

    /// Mark the forwarded event as handled by the caller. The turn
    /// moves to its dispatched phase; later candidates are still
    /// dropped.
    pub fn acknowledge(&self, turn_id: Uuid) {
        if let Some(state) = self.lock().get_mut(&turn_id) {
            state.completion_in_progress = false;
        }
    }

    /// Whether a terminal event has already been forwarded.
    pub fn is_terminal(&self, turn_id: Uuid) -> bool {
        self.lock()
            .get(&turn_id)
            .is_some_and(|s| s.terminal_reason.is_some())
    }

    /// Current suppression counters for a turn, if it is tracked.
    pub fn diagnostics(&self, turn_id: Uuid) -> Option<TurnDiagnostics> {
        self.lock().get(&turn_id).map(|s| TurnDiagnostics {
            suppressed_duplicates: s.suppressed_duplicates,
            rejected_partials: s.rejected_partials,
        })
    }

    /// Stop tracking a turn, returning its final counters.
    pub fn release(&self, turn_id: Uuid) -> Option<TurnDiagnostics> {
        self.lock().remove(&turn_id).map(|s| TurnDiagnostics {
            suppressed_duplicates: s.suppressed_duplicates,
            rejected_partials: s.rejected_partials,
        })
    }

    /// Drop all per-turn state.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Number of turns currently tracked.
    pub fn active_turns(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TurnCompletionState>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
