//! Messages exchanged with the chat gateway

use alior_util::{EventId, GroupId, UserId};
use serde::{Deserialize, Serialize};

/// Structured choice made by pressing an inline button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Selection {
    Group(GroupId),
    Event(EventId),
}

/// Body of an inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    Selection { selection: Selection },
}

/// One message or button press from a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub user_id: UserId,

    /// Chat username, used to register the user and resolve group members
    #[serde(default)]
    pub user_name: Option<String>,

    pub payload: Payload,

    /// Gateway hint: the text came from a menu button or a slash command
    #[serde(default)]
    pub is_command: bool,
}

impl InboundEvent {
    pub fn text(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: None,
            payload: Payload::Text { text: text.into() },
            is_command: false,
        }
    }

    pub fn command(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            is_command: true,
            ..Self::text(user_id, text)
        }
    }

    pub fn selection(user_id: UserId, selection: Selection) -> Self {
        Self {
            user_id,
            user_name: None,
            payload: Payload::Selection { selection },
            is_command: false,
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

/// A selectable option attached to an outbound message.
///
/// Options without a selection are plain reply buttons: pressing one sends
/// its label back as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

impl ReplyOption {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            selection: None,
        }
    }

    pub fn select(label: impl Into<String>, selection: Selection) -> Self {
        Self {
            label: label.into(),
            selection: Some(selection),
        }
    }
}

/// A prompt delivered to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub user_id: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ReplyOption>,
}

impl OutboundMessage {
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<ReplyOption>) -> Self {
        self.options = options;
        self
    }
}
