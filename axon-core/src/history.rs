//! Legacy history conversion.
//!
//! Older conversation documents store one flat object per message
//! (model and UI fields mixed together), or one request/response pair
//! per turn. [`to_unified`] lifts either shape into dual-store record
//! pairs; [`to_legacy`] flattens back for persistence compatibility.
//! Conversion is best effort: malformed entries are skipped with a
//! recorded warning, never a hard failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::message::{
    LifecycleState, MessageContent, ModelMessage, Role, UiMessage,
};

/// Validation failures over a finished conversion.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A converted message carries the nil id.
    #[error("message at index {index} has a nil id")]
    NilId {
        /// Position in the converted message list.
        index: usize,
    },

    /// A model record and its UI record disagree on identity.
    #[error("message at index {index} pairs model id {model_id} with ui id {ui_id}")]
    IdMismatch {
        /// Position in the converted message list.
        index: usize,
        /// Identity on the model record.
        model_id: Uuid,
        /// Identity on the UI record.
        ui_id: Uuid,
    },

    /// Two converted messages share an id.
    #[error("duplicate message id {0}")]
    DuplicateId(Uuid),

    /// Pair entries produced a message count outside `[pairs, 2*pairs]`.
    #[error("{messages} messages from {pairs} pair entries violates the pair count bound")]
    PairCountInvariant {
        /// Messages attributable to pair entries.
        messages: usize,
        /// Pair entries that contributed at least one message.
        pairs: usize,
    },
}

/// A legacy flat record: one object per message, model and UI fields
/// mixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFlatRecord {
    /// Message identity, if the document recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Message role.
    pub role: Role,
    /// Flattened message text.
    pub content: String,
    /// Provider name, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model name, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation timestamp. Entries without one are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Rendering visibility.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Presentation override, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_override: Option<String>,
    /// True for messages the user literally typed.
    #[serde(default)]
    pub is_user_submission: bool,
    /// True for machine-fabricated messages.
    #[serde(default)]
    pub is_synthetic: bool,
}

fn default_visible() -> bool {
    true
}

/// The older request/response pair shape: one object per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPairRecord {
    /// The user's request text, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    /// The assistant's response text, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Provider name shared by both sides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model name shared by both sides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Timestamp shared by both sides. Entries without one are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One entry of a legacy history document, tagged by schema shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum LegacyEntry {
    /// Flat per-message record.
    Flat(LegacyFlatRecord),
    /// Request/response pair record.
    Pair(LegacyPairRecord),
}

/// A converted message: the model record and its paired UI record.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedMessage {
    /// Model-facing record.
    pub model: ModelMessage,
    /// UI-facing record, same id.
    pub ui: UiMessage,
}

/// Entry counts observed during a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// Pair entries that contributed at least one message.
    pub pair_entries: usize,
    /// Flat entries that were converted.
    pub flat_entries: usize,
    /// Entries skipped as malformed.
    pub skipped_entries: usize,
}

/// Result of [`to_unified`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    /// Converted messages, in document order.
    pub messages: Vec<UnifiedMessage>,
    /// Human-readable notes about skipped entries.
    pub warnings: Vec<String>,
    /// Entry counts.
    pub stats: ConversionStats,
}

impl Conversion {
    /// Check the structural invariants of a finished conversion.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant: nil or mismatched ids,
    /// duplicate ids, or a message count outside the `[pairs, 2*pairs]`
    /// bound for pair entries.
    pub fn validate(&self) -> Result<(), HistoryError> {
        let mut seen = std::collections::HashSet::new();
        for (index, msg) in self.messages.iter().enumerate() {
            if msg.model.id.is_nil() {
                return Err(HistoryError::NilId { index });
            }
            if msg.model.id != msg.ui.id {
                return Err(HistoryError::IdMismatch {
                    index,
                    model_id: msg.model.id,
                    ui_id: msg.ui.id,
                });
            }
            if !seen.insert(msg.model.id) {
                return Err(HistoryError::DuplicateId(msg.model.id));
            }
        }

        let pair_messages = self.messages.len() - self.stats.flat_entries;
        if self.stats.pair_entries > 0
            && (pair_messages < self.stats.pair_entries
                || pair_messages > 2 * self.stats.pair_entries)
        {
            return Err(HistoryError::PairCountInvariant {
                messages: pair_messages,
                pairs: self.stats.pair_entries,
            });
        }
        Ok(())
    }
}

/// Convert a legacy history into dual-store message pairs.
///
/// `None` entries (JSON nulls) and entries without a timestamp are
/// skipped with a warning. A pair entry missing one side produces
/// exactly one message.
pub fn to_unified(entries: &[Option<LegacyEntry>]) -> Conversion {
    let mut conversion = Conversion::default();

    for (index, entry) in entries.iter().enumerate() {
        match entry {
            None => skip(&mut conversion, format!("entry {index} is null")),
            Some(LegacyEntry::Flat(flat)) => convert_flat(&mut conversion, index, flat),
            Some(LegacyEntry::Pair(pair)) => convert_pair(&mut conversion, index, pair),
        }
    }

    conversion
}

/// Flatten converted messages back into legacy flat records.
///
/// Round-tripping preserves role, content, visibility, and provider
/// for every message; pair entries come back as two flat entries.
pub fn to_legacy(messages: &[UnifiedMessage]) -> Vec<LegacyEntry> {
    messages
        .iter()
        .map(|msg| {
            LegacyEntry::Flat(LegacyFlatRecord {
                id: Some(msg.model.id),
                role: msg.model.role,
                content: msg.model.content.flattened(),
                provider: non_empty(&msg.model.provider),
                model: non_empty(&msg.model.model_name),
                timestamp: Some(msg.model.created_at),
                visible: msg.ui.visible,
                display_override: msg.ui.display_override.clone(),
                is_user_submission: msg.model.is_user_submission,
                is_synthetic: msg.model.is_synthetic,
            })
        })
        .collect()
}

fn convert_flat(conversion: &mut Conversion, index: usize, flat: &LegacyFlatRecord) {
    let Some(timestamp) = flat.timestamp else {
        skip(conversion, format!("entry {index} has no timestamp"));
        return;
    };

    let id = flat.id.unwrap_or_else(Uuid::now_v7);
    let model = ModelMessage {
        id,
        role: flat.role,
        content: MessageContent::Plain(flat.content.clone()),
        provider: flat.provider.clone().unwrap_or_default(),
        model_name: flat.model.clone().unwrap_or_default(),
        created_at: timestamp,
        lifecycle_state: LifecycleState::Generated,
        is_user_submission: flat.is_user_submission,
        is_synthetic: flat.is_synthetic,
    };
    let mut ui = UiMessage::for_message(id).with_visible(flat.visible);
    ui.display_override = flat.display_override.clone();
    ui.is_synthetic = flat.is_synthetic;

    conversion.messages.push(UnifiedMessage { model, ui });
    conversion.stats.flat_entries += 1;
}

fn convert_pair(conversion: &mut Conversion, index: usize, pair: &LegacyPairRecord) {
    let Some(timestamp) = pair.timestamp else {
        skip(conversion, format!("entry {index} has no timestamp"));
        return;
    };
    if pair.request.is_none() && pair.response.is_none() {
        skip(conversion, format!("entry {index} has neither side"));
        return;
    }

    let provider = pair.provider.clone().unwrap_or_default();
    let model_name = pair.model.clone().unwrap_or_default();

    if let Some(request) = &pair.request {
        let model = ModelMessage::user(request.clone())
            .with_created_at(timestamp)
            .with_provider(&provider)
            .with_model_name(&model_name);
        let ui = UiMessage::for_message(model.id);
        conversion.messages.push(UnifiedMessage { model, ui });
    }
    if let Some(response) = &pair.response {
        let mut model = ModelMessage::assistant(response.clone())
            .with_created_at(timestamp)
            .with_provider(&provider)
            .with_model_name(&model_name);
        model.lifecycle_state = LifecycleState::Generated;
        let ui = UiMessage::for_message(model.id);
        conversion.messages.push(UnifiedMessage { model, ui });
    }

    conversion.stats.pair_entries += 1;
}

fn skip(conversion: &mut Conversion, warning: String) {
    tracing::warn!(%warning, "history: skipping legacy entry");
    conversion.warnings.push(warning);
    conversion.stats.skipped_entries += 1;
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}
