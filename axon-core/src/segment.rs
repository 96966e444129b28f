//! Incremental classification of streamed model output.
//!
//! Providers that speak the text-embedded tool protocol interleave
//! plain prose with `<tool>name(payload)</tool>` markup. [`parse`]
//! splits the accumulated text of one streaming turn into ordered
//! [`Segment`]s, tolerating input truncated anywhere, including in the
//! middle of a marker. The parser is pure: all cross-call state lives
//! in the caller-owned [`ParseState`].

#[cfg(test)]
mod tests;

/// Opening delimiter of tool-invocation markup.
pub const TOOL_START_MARKER: &str = "<tool>";

/// Closing delimiter of tool-invocation markup.
pub const TOOL_END_MARKER: &str = "</tool>";

/// A classified unit of streamed output, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text.
    Text {
        /// The text content.
        text: String,
    },
    /// A recognized tool invocation.
    ToolInvocation {
        /// Tool name extracted from the payload region.
        tool_name: String,
        /// Everything between the markers, uninterpreted. Grows on
        /// successive passes while the invocation is still open.
        raw_payload: String,
        /// False until the closing marker has been seen. An incomplete
        /// invocation can only be the last segment of a pass.
        complete: bool,
    },
}

impl Segment {
    /// The source text this segment was classified from.
    ///
    /// Concatenating `source_text` over a pass's segments reproduces
    /// the parsed input exactly.
    pub fn source_text(&self) -> String {
        match self {
            Segment::Text { text } => text.clone(),
            Segment::ToolInvocation {
                raw_payload,
                complete,
                ..
            } => {
                if *complete {
                    format!("{TOOL_START_MARKER}{raw_payload}{TOOL_END_MARKER}")
                } else {
                    format!("{TOOL_START_MARKER}{raw_payload}")
                }
            }
        }
    }
}

/// Parser state threaded across successive passes of one streaming
/// turn.
///
/// Created at turn start, updated by every [`parse`] call for that
/// turn, discarded (or [`reset`](ParseState::reset)) when the turn
/// ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseState {
    /// Trailing input that is currently classified as text but may
    /// become markup once more characters arrive: an incomplete start
    /// marker (`"<to"`) or an open tag whose payload is not yet
    /// well-formed enough to name a tool. The same characters are also
    /// present in the final `Text` segment, so segment contents always
    /// account for the whole input.
    pub buffered_tail: String,
    /// Tool invocations found in the turn so far (complete and open).
    /// Recomputed on every pass; the input is cumulative, so this is a
    /// turn total.
    pub tool_count: usize,
    /// Invocations still missing their closing marker. Zero or one;
    /// nothing can follow an open invocation within a pass.
    pub partial_tool_count: usize,
    /// Latched true once a pass has seen at least one complete
    /// invocation with no tag left open. Cleared only by `reset`.
    pub completion_observed: bool,
}

impl ParseState {
    /// Fresh state for a new streaming turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; ready for the next turn.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-pass counters, copied out of [`ParseState`] for callers that
/// want to diff successive passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Tool invocations found so far (complete and open).
    pub tool_count: usize,
    /// Invocations still missing their closing marker.
    pub partial_tool_count: usize,
    /// Whether tool markup has fully closed at least once this turn.
    pub completion_observed: bool,
}

/// Result of one parser pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Segments in document order.
    pub segments: Vec<Segment>,
    /// Counters after this pass.
    pub summary: ParseSummary,
}

/// Classify the full text seen so far this turn.
///
/// The input is cumulative, not a delta: each call re-scans everything
/// the turn has produced. Truncation anywhere is fine; an open
/// invocation is emitted with `complete = false`, and a region that
/// cannot be classified yet stays text until a later pass.
///
/// # Examples
///
/// ```
/// use axon_core::segment::{ParseState, Segment, parse};
///
/// let mut state = ParseState::new();
/// let outcome = parse("Hello <tool>write(path=a.txt)", &mut state);
///
/// assert_eq!(
///     outcome.segments[0],
///     Segment::Text { text: "Hello ".to_string() }
/// );
/// assert!(matches!(
///     &outcome.segments[1],
///     Segment::ToolInvocation { tool_name, complete: false, .. }
///         if tool_name == "write"
/// ));
/// ```
pub fn parse(text: &str, state: &mut ParseState) -> ParseOutcome {
    let mut segments: Vec<Segment> = Vec::new();
    let mut tool_count = 0usize;
    let mut partial_tool_count = 0usize;
    let mut tail_start: Option<usize> = None;

    // Start of the text run that has not been emitted yet.
    let mut pending = 0usize;
    // Scan cursor. Always >= pending.
    let mut pos = 0usize;

    while let Some(rel) = text[pos..].find(TOOL_START_MARKER) {
        let start = pos + rel;
        let inner_start = start + TOOL_START_MARKER.len();

        match text[inner_start..].find(TOOL_END_MARKER) {
            Some(end_rel) => {
                let inner = &text[inner_start..inner_start + end_rel];
                if let Some(name) = extract_tool_name(inner) {
                    push_text(&mut segments, &text[pending..start]);
                    segments.push(Segment::ToolInvocation {
                        tool_name: name.to_string(),
                        raw_payload: inner.to_string(),
                        complete: true,
                    });
                    tool_count += 1;
                    pos = inner_start + end_rel + TOOL_END_MARKER.len();
                    pending = pos;
                } else {
                    // A closed tag without a recognizable tool name
                    // stays literal text. Resume scanning right after
                    // the start marker so inner markup is still found.
                    pos = inner_start;
                }
            }
            None => {
                let inner = &text[inner_start..];
                if let Some(name) = extract_tool_name(inner) {
                    push_text(&mut segments, &text[pending..start]);
                    segments.push(Segment::ToolInvocation {
                        tool_name: name.to_string(),
                        raw_payload: inner.to_string(),
                        complete: false,
                    });
                    tool_count += 1;
                    partial_tool_count += 1;
                    pending = text.len();
                } else {
                    // Open tag that cannot be named yet: plain text for
                    // now, reclassified once more characters arrive.
                    tail_start = Some(start);
                }
                break;
            }
        }
    }

    if pending < text.len() {
        push_text(&mut segments, &text[pending..]);
    }

    // An incomplete start marker at the end of trailing text is also a
    // candidate for reclassification. Not applicable when an open
    // invocation already owns the tail.
    if tail_start.is_none()
        && partial_tool_count == 0
        && let Some(k) = trailing_marker_prefix_len(text)
        && text.len() - k >= pending
    {
        tail_start = Some(text.len() - k);
    }

    debug_assert!(partial_tool_count <= 1);
    debug_assert!(
        segments
            .iter()
            .all(|s| !matches!(s, Segment::ToolInvocation { complete: false, .. }))
            || matches!(
                segments.last(),
                Some(Segment::ToolInvocation {
                    complete: false,
                    ..
                })
            )
    );

    state.buffered_tail = tail_start.map(|s| text[s..].to_string()).unwrap_or_default();
    state.tool_count = tool_count;
    state.partial_tool_count = partial_tool_count;
    if tool_count > 0 && partial_tool_count == 0 {
        state.completion_observed = true;
    }

    ParseOutcome {
        segments,
        summary: ParseSummary {
            tool_count,
            partial_tool_count,
            completion_observed: state.completion_observed,
        },
    }
}

/// Append a text run, merging into a preceding `Text` segment.
fn push_text(segments: &mut Vec<Segment>, run: &str) {
    if run.is_empty() {
        return;
    }
    if let Some(Segment::Text { text }) = segments.last_mut() {
        text.push_str(run);
    } else {
        segments.push(Segment::Text {
            text: run.to_string(),
        });
    }
}

/// Extract the tool name from a payload region.
///
/// The name is a leading identifier (after optional whitespace) that
/// must be followed by `(` or by the end of the captured region.
/// Returns `None` when the region is not well-formed enough yet.
fn extract_tool_name(inner: &str) -> Option<&str> {
    let trimmed = inner.trim_start();
    let name_len = trimmed
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if name_len == 0 {
        return None;
    }
    let name = &trimmed[..name_len];
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    let rest = trimmed[name_len..].trim_start();
    if rest.is_empty() || rest.starts_with('(') {
        Some(name)
    } else {
        None
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Length of the longest proper prefix of the start marker that the
/// input ends with.
fn trailing_marker_prefix_len(text: &str) -> Option<usize> {
    (1..TOOL_START_MARKER.len())
        .rev()
        .find(|&k| text.ends_with(&TOOL_START_MARKER[..k]))
}
