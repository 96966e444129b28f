//! Shared message store for the streaming pipeline.
//!
//! Holds the model-facing and UI-facing record collections behind one
//! reader-writer lock so mutation is single-writer and enumeration is
//! never torn by a concurrent insert. The only coupling between the
//! two collections is cache invalidation: replacing a model record
//! with changed content or timestamp clears the paired UI record's
//! cached rendering.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::message::{CachedRender, ModelMessage, UiMessage};

#[derive(Debug, Default)]
struct StoreInner {
    model: HashMap<Uuid, ModelMessage>,
    ui: HashMap<Uuid, UiMessage>,
    /// Model-record ids in first-insert order; breaks timestamp ties
    /// during ordered enumeration.
    arrival: Vec<Uuid>,
}

/// Thread-safe dual store of [`ModelMessage`] / [`UiMessage`] pairs.
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: RwLock<StoreInner>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model record, or replace the one already stored under
    /// its id.
    ///
    /// Replacing a record whose content or timestamp differs from the
    /// stored one invalidates the paired UI record's cached rendering.
    pub fn upsert_model_message(&self, msg: ModelMessage) {
        let mut guard = self.write();
        let inner = &mut *guard;

        match inner.model.get(&msg.id) {
            Some(existing) => {
                let stale = existing.content != msg.content || existing.created_at != msg.created_at;
                if stale && let Some(ui) = inner.ui.get_mut(&msg.id) {
                    ui.cached_render = None;
                }
            }
            None => inner.arrival.push(msg.id),
        }
        inner.model.insert(msg.id, msg);
    }

    /// Insert or replace a UI record. The model collection is never
    /// touched.
    pub fn upsert_ui_message(&self, msg: UiMessage) {
        self.write().ui.insert(msg.id, msg);
    }

    /// Look up a model record. Absence is an expected condition, not
    /// an error.
    pub fn get_model(&self, id: Uuid) -> Option<ModelMessage> {
        self.read().model.get(&id).cloned()
    }

    /// Look up a UI record.
    pub fn get_ui(&self, id: Uuid) -> Option<UiMessage> {
        self.read().ui.get(&id).cloned()
    }

    /// All model records, ordered by `created_at` ascending with ties
    /// broken by insertion order. This is the conversation as it would
    /// be sent back to a provider.
    pub fn all_model_messages_ordered(&self) -> Vec<ModelMessage> {
        let inner = self.read();
        let mut out: Vec<ModelMessage> = inner
            .arrival
            .iter()
            .filter_map(|id| inner.model.get(id).cloned())
            .collect();
        out.sort_by_key(|m| m.created_at);
        out
    }

    /// Visible UI records, in the same order as their paired model
    /// records.
    pub fn visible_ui_messages(&self) -> Vec<UiMessage> {
        let inner = self.read();
        let mut ordered: Vec<(DateTime<Utc>, usize)> = inner
            .arrival
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| inner.model.get(id).map(|m| (m.created_at, idx)))
            .collect();
        ordered.sort();
        ordered
            .into_iter()
            .filter_map(|(_, idx)| inner.ui.get(&inner.arrival[idx]))
            .filter(|ui| ui.visible)
            .cloned()
            .collect()
    }

    /// Empty both collections. Atomic from the caller's point of view.
    pub fn clear(&self) {
        *self.write() = StoreInner::default();
    }

    /// The cached rendering for a message, if it is still valid
    /// against the given model timestamp.
    pub fn get_cached_render(
        &self,
        id: Uuid,
        current_model_timestamp: DateTime<Utc>,
    ) -> Option<CachedRender> {
        self.read()
            .ui
            .get(&id)
            .and_then(|ui| ui.cached_render.clone())
            .filter(|cache| cache.model_timestamp >= current_model_timestamp)
    }

    /// Store a freshly computed rendering, stamped against the paired
    /// model record's current timestamp.
    ///
    /// Returns false when no UI record exists for the id.
    pub fn update_cache(&self, id: Uuid, output: impl Into<String>) -> bool {
        let mut guard = self.write();
        let inner = &mut *guard;

        let model_timestamp = inner
            .model
            .get(&id)
            .map(|m| m.created_at)
            .unwrap_or_else(Utc::now);
        match inner.ui.get_mut(&id) {
            Some(ui) => {
                ui.cached_render = Some(CachedRender {
                    output: output.into(),
                    model_timestamp,
                });
                true
            }
            None => false,
        }
    }

    /// Number of model records held.
    pub fn len(&self) -> usize {
        self.read().model.len()
    }

    /// True when no model records are held.
    pub fn is_empty(&self) -> bool {
        self.read().model.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
