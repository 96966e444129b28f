use super::*;
use crate::message::{LifecycleState, MessageContent, ModelMessage, UiMessage};

use chrono::TimeZone;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn model_at(text: &str, secs: i64) -> ModelMessage {
    ModelMessage::user(text).with_created_at(ts(secs))
}

#[test]
fn test_upsert_and_get() {
    let store = MessageStore::new();
    let msg = ModelMessage::user("Hi");
    let id = msg.id;

    store.upsert_model_message(msg.clone());
    store.upsert_ui_message(UiMessage::for_message(id));

    assert_eq!(store.get_model(id), Some(msg));
    assert!(store.get_ui(id).unwrap().visible);
}

#[test]
fn test_get_missing_returns_none() {
    let store = MessageStore::new();
    assert_eq!(store.get_model(Uuid::new_v4()), None);
    assert_eq!(store.get_ui(Uuid::new_v4()), None);
}

#[test]
fn test_upsert_replaces_by_id() {
    let store = MessageStore::new();
    let first = model_at("draft", 10);
    let id = first.id;
    store.upsert_model_message(first);

    let replaced = model_at("final", 10).with_id(id);
    store.upsert_model_message(replaced);

    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get_model(id).unwrap().content,
        MessageContent::Plain("final".to_string())
    );
}

#[test]
fn test_ordered_by_created_at() {
    let store = MessageStore::new();
    let late = model_at("late", 300);
    let early = model_at("early", 100);
    let mid = model_at("mid", 200);
    store.upsert_model_message(late.clone());
    store.upsert_model_message(early.clone());
    store.upsert_model_message(mid.clone());

    let ordered = store.all_model_messages_ordered();
    let ids: Vec<Uuid> = ordered.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![early.id, mid.id, late.id]);
}

#[test]
fn test_ordering_non_decreasing_for_any_insertion_order() {
    let timestamps = [50, 10, 40, 20, 30, 60];
    let store = MessageStore::new();
    for secs in timestamps {
        store.upsert_model_message(model_at("m", secs));
    }

    let ordered = store.all_model_messages_ordered();
    assert_eq!(ordered.len(), timestamps.len());
    for pair in ordered.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}

#[test]
fn test_timestamp_ties_broken_by_insertion_order() {
    let store = MessageStore::new();
    let a = model_at("a", 100);
    let b = model_at("b", 100);
    let c = model_at("c", 100);
    store.upsert_model_message(a.clone());
    store.upsert_model_message(b.clone());
    store.upsert_model_message(c.clone());

    let ids: Vec<Uuid> = store
        .all_model_messages_ordered()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
}

#[test]
fn test_visible_filter_preserves_model_order() {
    let store = MessageStore::new();
    let a = model_at("a", 100);
    let b = model_at("b", 200);
    let c = model_at("c", 300);
    for m in [&a, &b, &c] {
        store.upsert_model_message(m.clone());
    }
    store.upsert_ui_message(UiMessage::for_message(a.id));
    store.upsert_ui_message(UiMessage::for_message(b.id).with_visible(false));
    store.upsert_ui_message(UiMessage::for_message(c.id));

    let visible: Vec<Uuid> = store.visible_ui_messages().iter().map(|u| u.id).collect();
    assert_eq!(visible, vec![a.id, c.id]);
}

#[test]
fn test_unpaired_ui_record_not_enumerated() {
    let store = MessageStore::new();
    store.upsert_ui_message(UiMessage::for_message(Uuid::new_v4()));
    assert!(store.visible_ui_messages().is_empty());
}

#[test]
fn test_clear_empties_both_collections() {
    let store = MessageStore::new();
    let msg = ModelMessage::user("x");
    let id = msg.id;
    store.upsert_model_message(msg);
    store.upsert_ui_message(UiMessage::for_message(id));

    store.clear();

    assert!(store.is_empty());
    assert_eq!(store.get_ui(id), None);
    assert!(store.all_model_messages_ordered().is_empty());
}

#[test]
fn test_cache_roundtrip() {
    let store = MessageStore::new();
    let msg = model_at("hello", 100);
    let id = msg.id;
    store.upsert_model_message(msg);
    store.upsert_ui_message(UiMessage::for_message(id));

    assert!(store.get_cached_render(id, ts(100)).is_none());
    assert!(store.update_cache(id, "rendered hello"));

    let cache = store.get_cached_render(id, ts(100)).unwrap();
    assert_eq!(cache.output, "rendered hello");
}

#[test]
fn test_content_change_invalidates_cache() {
    let store = MessageStore::new();
    let msg = model_at("v1", 100);
    let id = msg.id;
    store.upsert_model_message(msg.clone());
    store.upsert_ui_message(UiMessage::for_message(id));
    store.update_cache(id, "render of v1");

    let mut changed = msg;
    changed.content = MessageContent::Plain("v2".to_string());
    store.upsert_model_message(changed);

    assert!(store.get_cached_render(id, ts(100)).is_none());

    store.update_cache(id, "render of v2");
    assert!(store.get_cached_render(id, ts(100)).is_some());
}

#[test]
fn test_timestamp_bump_invalidates_cache() {
    let store = MessageStore::new();
    let msg = model_at("same text", 100);
    let id = msg.id;
    store.upsert_model_message(msg.clone());
    store.upsert_ui_message(UiMessage::for_message(id));
    store.update_cache(id, "rendered");

    store.upsert_model_message(msg.with_created_at(ts(200)));

    assert!(store.get_cached_render(id, ts(200)).is_none());
}

#[test]
fn test_unchanged_upsert_keeps_cache() {
    let store = MessageStore::new();
    let mut msg = model_at("stable", 100);
    let id = msg.id;
    store.upsert_model_message(msg.clone());
    store.upsert_ui_message(UiMessage::for_message(id));
    store.update_cache(id, "rendered");

    // Lifecycle flip alone leaves content and timestamp untouched.
    msg.lifecycle_state = LifecycleState::Generated;
    store.upsert_model_message(msg);

    assert!(store.get_cached_render(id, ts(100)).is_some());
}

#[test]
fn test_stale_cache_rejected_by_newer_timestamp() {
    let store = MessageStore::new();
    let msg = model_at("text", 100);
    let id = msg.id;
    store.upsert_model_message(msg);
    store.upsert_ui_message(UiMessage::for_message(id));
    store.update_cache(id, "rendered at 100");

    // The consumer asking against a newer model timestamp must
    // recompute.
    assert!(store.get_cached_render(id, ts(150)).is_none());
}

#[test]
fn test_update_cache_without_ui_record() {
    let store = MessageStore::new();
    assert!(!store.update_cache(Uuid::new_v4(), "orphan"));
}

#[test]
fn test_ui_upsert_never_touches_model_store() {
    let store = MessageStore::new();
    let msg = model_at("text", 100);
    let id = msg.id;
    store.upsert_model_message(msg.clone());

    store.upsert_ui_message(UiMessage::for_message(id).with_visible(false));
    store.upsert_ui_message(UiMessage::for_message(id).with_display_override("x"));

    assert_eq!(store.get_model(id), Some(msg));
}

#[test]
fn test_concurrent_writers_do_not_tear_enumeration() {
    use std::sync::Arc;
    use std::thread;

    let store = Arc::new(MessageStore::new());
    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                store.upsert_model_message(model_at("m", t * 1000 + i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let ordered = store.all_model_messages_ordered();
    assert_eq!(ordered.len(), 100);
    for pair in ordered.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}
