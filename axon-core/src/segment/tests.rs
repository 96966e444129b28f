use super::*;

fn text_seg(s: &str) -> Segment {
    Segment::Text {
        text: s.to_string(),
    }
}

fn reconstruct(segments: &[Segment]) -> String {
    segments.iter().map(Segment::source_text).collect()
}

#[test]
fn test_plain_text_only() {
    let mut state = ParseState::new();
    let outcome = parse("Hello world", &mut state);

    assert_eq!(outcome.segments, vec![text_seg("Hello world")]);
    assert_eq!(outcome.summary.tool_count, 0);
    assert_eq!(outcome.summary.partial_tool_count, 0);
    assert!(!outcome.summary.completion_observed);
}

#[test]
fn test_empty_input() {
    let mut state = ParseState::new();
    let outcome = parse("", &mut state);

    assert!(outcome.segments.is_empty());
    assert_eq!(state.buffered_tail, "");
}

#[test]
fn test_unterminated_invocation_after_text() {
    let mut state = ParseState::new();
    let outcome = parse("Hello <tool>write(path=a.txt)", &mut state);

    assert_eq!(outcome.segments.len(), 2);
    assert_eq!(outcome.segments[0], text_seg("Hello "));
    assert_eq!(
        outcome.segments[1],
        Segment::ToolInvocation {
            tool_name: "write".to_string(),
            raw_payload: "write(path=a.txt)".to_string(),
            complete: false,
        }
    );
    assert_eq!(outcome.summary.tool_count, 1);
    assert_eq!(outcome.summary.partial_tool_count, 1);
    assert!(!outcome.summary.completion_observed);
}

#[test]
fn test_complete_invocation_then_text() {
    let mut state = ParseState::new();
    let outcome = parse("<tool>write(path=a.txt)</tool>Done", &mut state);

    assert_eq!(outcome.segments.len(), 2);
    assert_eq!(
        outcome.segments[0],
        Segment::ToolInvocation {
            tool_name: "write".to_string(),
            raw_payload: "write(path=a.txt)".to_string(),
            complete: true,
        }
    );
    assert_eq!(outcome.segments[1], text_seg("Done"));
    assert_eq!(outcome.summary.tool_count, 1);
    assert_eq!(outcome.summary.partial_tool_count, 0);
    assert!(outcome.summary.completion_observed);
}

#[test]
fn test_multiple_invocations_in_order() {
    let mut state = ParseState::new();
    let outcome = parse(
        "a<tool>one(1)</tool>b<tool>two(2)</tool>c",
        &mut state,
    );

    let names: Vec<&str> = outcome
        .segments
        .iter()
        .filter_map(|s| match s {
            Segment::ToolInvocation { tool_name, .. } => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["one", "two"]);
    assert_eq!(outcome.segments.len(), 5);
    assert_eq!(outcome.segments[0], text_seg("a"));
    assert_eq!(outcome.segments[2], text_seg("b"));
    assert_eq!(outcome.segments[4], text_seg("c"));
    assert_eq!(outcome.summary.tool_count, 2);
}

#[test]
fn test_partial_invocation_is_always_last() {
    let mut state = ParseState::new();
    let outcome = parse("<tool>a(1)</tool>mid<tool>b(2", &mut state);

    assert!(matches!(
        outcome.segments.last(),
        Some(Segment::ToolInvocation {
            complete: false,
            ..
        })
    ));
    assert_eq!(outcome.summary.tool_count, 2);
    assert_eq!(outcome.summary.partial_tool_count, 1);
}

#[test]
fn test_bare_name_without_parens() {
    let mut state = ParseState::new();
    let outcome = parse("<tool>refresh</tool>", &mut state);

    assert_eq!(
        outcome.segments,
        vec![Segment::ToolInvocation {
            tool_name: "refresh".to_string(),
            raw_payload: "refresh".to_string(),
            complete: true,
        }]
    );
}

#[test]
fn test_unnameable_closed_tag_stays_text() {
    // No identifier before the payload: never a tool call.
    let mut state = ParseState::new();
    let outcome = parse("<tool>123!</tool>", &mut state);

    assert_eq!(outcome.segments, vec![text_seg("<tool>123!</tool>")]);
    assert_eq!(outcome.summary.tool_count, 0);
}

#[test]
fn test_prose_inside_tag_stays_text() {
    let mut state = ParseState::new();
    let outcome = parse("<tool>write me a file</tool>", &mut state);

    assert_eq!(
        outcome.segments,
        vec![text_seg("<tool>write me a file</tool>")]
    );
}

#[test]
fn test_open_tag_without_name_is_text_for_now() {
    let mut state = ParseState::new();
    let outcome = parse("see <tool>", &mut state);

    assert_eq!(outcome.segments, vec![text_seg("see <tool>")]);
    assert_eq!(state.buffered_tail, "<tool>");
    assert_eq!(outcome.summary.tool_count, 0);
}

#[test]
fn test_incomplete_start_marker_buffered() {
    let mut state = ParseState::new();
    let outcome = parse("Hello <to", &mut state);

    // Still part of the text output, but flagged as reclassifiable.
    assert_eq!(outcome.segments, vec![text_seg("Hello <to")]);
    assert_eq!(state.buffered_tail, "<to");
}

#[test]
fn test_reclassification_across_passes() {
    let mut state = ParseState::new();

    let outcome = parse("Hi <to", &mut state);
    assert_eq!(outcome.segments, vec![text_seg("Hi <to")]);
    assert_eq!(state.buffered_tail, "<to");

    let outcome = parse("Hi <tool>w", &mut state);
    assert_eq!(outcome.segments.len(), 2);
    assert_eq!(
        outcome.segments[1],
        Segment::ToolInvocation {
            tool_name: "w".to_string(),
            raw_payload: "w".to_string(),
            complete: false,
        }
    );
    assert!(state.buffered_tail.is_empty());

    let outcome = parse("Hi <tool>w(p=1)</tool>", &mut state);
    assert_eq!(
        outcome.segments[1],
        Segment::ToolInvocation {
            tool_name: "w".to_string(),
            raw_payload: "w(p=1)".to_string(),
            complete: true,
        }
    );
    assert!(outcome.summary.completion_observed);
}

#[test]
fn test_completion_observed_latches() {
    let mut state = ParseState::new();

    parse("<tool>a(1)</tool>", &mut state);
    assert!(state.completion_observed);

    // A new open tag later in the turn does not clear the latch.
    let outcome = parse("<tool>a(1)</tool><tool>b(2", &mut state);
    assert_eq!(outcome.summary.partial_tool_count, 1);
    assert!(outcome.summary.completion_observed);
}

#[test]
fn test_completion_not_observed_while_tag_open() {
    let mut state = ParseState::new();
    let outcome = parse("x<tool>a(1", &mut state);

    assert!(!outcome.summary.completion_observed);
    assert!(!state.completion_observed);
}

#[test]
fn test_state_reset() {
    let mut state = ParseState::new();
    parse("<tool>a(1)</tool>", &mut state);
    assert!(state.completion_observed);

    state.reset();
    assert_eq!(state, ParseState::new());
}

#[test]
fn test_adjacent_text_runs_coalesced() {
    // Dead markup collapses back into one text segment.
    let mut state = ParseState::new();
    let outcome = parse("a<tool>!!</tool>b", &mut state);

    assert_eq!(outcome.segments, vec![text_seg("a<tool>!!</tool>b")]);
}

#[test]
fn test_nested_start_marker_recovers_inner_invocation() {
    let mut state = ParseState::new();
    let outcome = parse("<tool><tool>write(x)</tool>", &mut state);

    assert_eq!(outcome.segments.len(), 2);
    assert_eq!(outcome.segments[0], text_seg("<tool>"));
    assert_eq!(
        outcome.segments[1],
        Segment::ToolInvocation {
            tool_name: "write".to_string(),
            raw_payload: "write(x)".to_string(),
            complete: true,
        }
    );
}

#[test]
fn test_whitespace_before_name_accepted() {
    let mut state = ParseState::new();
    let outcome = parse("<tool> search(q=rust) </tool>", &mut state);

    assert_eq!(
        outcome.segments,
        vec![Segment::ToolInvocation {
            tool_name: "search".to_string(),
            raw_payload: " search(q=rust) ".to_string(),
            complete: true,
        }]
    );
}

#[test]
fn test_totality_over_all_truncations() {
    // Every prefix of a busy input parses without loss: concatenating
    // the recovered source of every segment reproduces the input.
    let full = "Intro <tool>write(path=a.txt, data={\"k\": 1})</tool> mid \
                <to<tool>run(cmd=ls)</tool><tool>open(f";
    for end in 0..=full.len() {
        if !full.is_char_boundary(end) {
            continue;
        }
        let input = &full[..end];
        let mut state = ParseState::new();
        let outcome = parse(input, &mut state);
        assert_eq!(
            reconstruct(&outcome.segments),
            input,
            "lossy parse for prefix of length {end}"
        );
    }
}

#[test]
fn test_totality_includes_buffered_tail_in_text() {
    let mut state = ParseState::new();
    let outcome = parse("abc<tool", &mut state);

    assert_eq!(reconstruct(&outcome.segments), "abc<tool");
    assert_eq!(state.buffered_tail, "<tool");
}

#[test]
fn test_counters_recomputed_per_pass() {
    let mut state = ParseState::new();

    parse("<tool>a(1", &mut state);
    assert_eq!(state.tool_count, 1);
    assert_eq!(state.partial_tool_count, 1);

    parse("<tool>a(1)</tool><tool>b(2)</tool>", &mut state);
    assert_eq!(state.tool_count, 2);
    assert_eq!(state.partial_tool_count, 0);
}

#[test]
fn test_payload_with_json_braces() {
    let mut state = ParseState::new();
    let outcome = parse(r#"<tool>edit(patch={"a": [1, 2]})</tool>"#, &mut state);

    assert_eq!(
        outcome.segments,
        vec![Segment::ToolInvocation {
            tool_name: "edit".to_string(),
            raw_payload: r#"edit(patch={"a": [1, 2]})"#.to_string(),
            complete: true,
        }]
    );
}

#[test]
fn test_hyphen_and_underscore_names() {
    let mut state = ParseState::new();
    let outcome = parse("<tool>web-search(q=1)</tool><tool>fs_read(p=2)</tool>", &mut state);

    let names: Vec<&str> = outcome
        .segments
        .iter()
        .filter_map(|s| match s {
            Segment::ToolInvocation { tool_name, .. } => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["web-search", "fs_read"]);
}

#[test]
fn test_multibyte_text_around_markup() {
    let mut state = ParseState::new();
    let outcome = parse("héllo 🦀<tool>run(x)</tool>日本語", &mut state);

    assert_eq!(outcome.segments.len(), 3);
    assert_eq!(outcome.segments[0], text_seg("héllo 🦀"));
    assert_eq!(outcome.segments[2], text_seg("日本語"));
    assert_eq!(reconstruct(&outcome.segments), "héllo 🦀<tool>run(x)</tool>日本語");
}
