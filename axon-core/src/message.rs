//! Dual-representation message types.
//!
//! Every conversation message has two records sharing one identity:
//! a [`ModelMessage`] (what is sent back to a model backend) and a
//! [`UiMessage`] (how the rendering layer presents it). The two are
//! stored and mutated independently; `id` is the only linkage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input submitted on behalf of the user.
    User,
    /// Output produced by (or attributed to) the model.
    Assistant,
}

impl Role {
    /// Wire-format name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One element of a structured message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Literal text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool invocation recovered from streamed markup.
    ToolInvocation {
        /// Name of the invoked tool.
        tool_name: String,
        /// Everything between the markers, uninterpreted. May be an
        /// incomplete structure while the invocation is still open.
        raw_payload: String,
        /// False until the closing marker has been seen.
        complete: bool,
    },
    /// The result of executing a tool, fed back into the conversation.
    ToolResult {
        /// Name of the tool that produced this result.
        tool_name: String,
        /// Tool output, uninterpreted.
        output: String,
    },
}

/// Message body: plain text or a structured sequence of content items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Plain(String),
    /// Ordered content items (text, tool invocations, tool results).
    Items(Vec<ContentItem>),
}

impl MessageContent {
    /// True when there is nothing to show: empty text or no items.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Plain(text) => text.is_empty(),
            MessageContent::Items(items) => items.is_empty(),
        }
    }

    /// Flatten the body into a single string.
    ///
    /// Tool invocations are rendered back into their markup form so
    /// flattening does not lose them; tool results contribute their
    /// output text.
    pub fn flattened(&self) -> String {
        match self {
            MessageContent::Plain(text) => text.clone(),
            MessageContent::Items(items) => {
                let mut out = String::new();
                for item in items {
                    match item {
                        ContentItem::Text { text } => out.push_str(text),
                        ContentItem::ToolInvocation {
                            raw_payload,
                            complete,
                            ..
                        } => {
                            out.push_str(crate::segment::TOOL_START_MARKER);
                            out.push_str(raw_payload);
                            if *complete {
                                out.push_str(crate::segment::TOOL_END_MARKER);
                            }
                        }
                        ContentItem::ToolResult { output, .. } => out.push_str(output),
                    }
                }
                out
            }
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Plain(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Plain(text.to_string())
    }
}

/// Whether a message is still being produced by a streaming turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// A streaming turn is still appending to this message.
    Generating,
    /// The message is final.
    Generated,
}

/// The model-facing record of a message.
///
/// Appended and updated only by the streaming orchestrator and by
/// history conversion; the rendering layer never writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Identity shared with the paired [`UiMessage`].
    pub id: Uuid,
    /// Role of this message.
    pub role: Role,
    /// Message body.
    pub content: MessageContent,
    /// Provider that produced (or will receive) this message.
    pub provider: String,
    /// Model name associated with this message.
    pub model_name: String,
    /// Creation timestamp; orders the conversation.
    pub created_at: DateTime<Utc>,
    /// Streaming lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// True for messages the user literally typed.
    pub is_user_submission: bool,
    /// True for machine-fabricated messages (injected placeholders,
    /// tool results) that were not literally produced by the model.
    pub is_synthetic: bool,
}

impl ModelMessage {
    /// Create a user message with a fresh time-sortable id.
    ///
    /// # Examples
    ///
    /// ```
    /// use axon_core::message::{ModelMessage, Role};
    ///
    /// let msg = ModelMessage::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.is_user_submission);
    /// ```
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::User,
            content: content.into(),
            provider: String::new(),
            model_name: String::new(),
            created_at: Utc::now(),
            lifecycle_state: LifecycleState::Generated,
            is_user_submission: true,
            is_synthetic: false,
        }
    }

    /// Create an assistant message in the `Generating` state.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::Assistant,
            content: content.into(),
            provider: String::new(),
            model_name: String::new(),
            created_at: Utc::now(),
            lifecycle_state: LifecycleState::Generating,
            is_user_submission: false,
            is_synthetic: false,
        }
    }

    /// Set the message identity.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Mark this message as machine-fabricated.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }
}

/// A pre-computed rendering and the model timestamp it was computed
/// against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRender {
    /// The rendered output.
    pub output: String,
    /// `created_at` of the paired [`ModelMessage`] at render time. The
    /// cache is stale whenever the live timestamp is newer.
    pub model_timestamp: DateTime<Utc>,
}

/// The rendering-facing record of a message.
///
/// Written by the streaming orchestrator (visibility and calling
/// flags) and by the rendering consumer (cache population); never by
/// anything that also writes the paired [`ModelMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    /// Identity shared with the paired [`ModelMessage`].
    pub id: Uuid,
    /// Whether the rendering layer should show this message.
    pub visible: bool,
    /// Presentation text overriding the literal content, if any.
    pub display_override: Option<String>,
    /// True while an associated tool invocation is still open.
    pub is_calling: bool,
    /// Cached rendering, if one has been computed and is still valid.
    pub cached_render: Option<CachedRender>,
    /// Mirrors [`ModelMessage::is_synthetic`].
    pub is_synthetic: bool,
}

impl UiMessage {
    /// Create a visible record paired with the given message identity.
    pub fn for_message(id: Uuid) -> Self {
        Self {
            id,
            visible: true,
            display_override: None,
            is_calling: false,
            cached_render: None,
            is_synthetic: false,
        }
    }

    /// Set visibility.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set a presentation override.
    #[must_use]
    pub fn with_display_override(mut self, text: impl Into<String>) -> Self {
        self.display_override = Some(text.into());
        self
    }
}
