//! Inbound and outbound message types.
//!
//! `InboundMessage` is what the transport delivers; `MessagePayload` is what
//! the bot sends back. `PendingReply` pairs a payload with its destination
//! while the session is not ready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;

/// A message received from the chat protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Protocol message ID.
    pub id: String,
    /// Conversation the message arrived in.
    pub conversation: ConversationId,
    /// Author of the message (participant ID in groups, same as
    /// `conversation` in direct chats).
    pub sender: String,
    /// Display name announced by the sender, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Whether the message was sent by this device.
    #[serde(default)]
    pub from_self: bool,
    pub timestamp: DateTime<Utc>,
    pub content: InboundContent,
}

/// Payload shapes the transport can deliver.
///
/// Several shapes carry user text; see [`InboundContent::text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundContent {
    /// Plain text.
    Text { text: String },
    /// Text with context (quoted reply, link preview, mentions).
    ExtendedText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    /// Reply to an interactive button message.
    ButtonReply { selected_text: String },
    /// Reply to an interactive list message.
    ListReply { title: String },
    /// Anything the bot does not inspect (stickers, audio, polls, ...).
    #[serde(other)]
    Other,
}

impl InboundContent {
    /// Extract the user-visible text from whichever shape carries it.
    pub fn text(&self) -> Option<&str> {
        match self {
            InboundContent::Text { text } => Some(text),
            InboundContent::ExtendedText { text, .. } => Some(text),
            InboundContent::Image { caption, .. }
            | InboundContent::Video { caption }
            | InboundContent::Document { caption, .. } => caption.as_deref(),
            InboundContent::ButtonReply { selected_text } => Some(selected_text),
            InboundContent::ListReply { title } => Some(title),
            InboundContent::Other => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, InboundContent::Image { .. })
    }
}

/// Where media bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MediaSource {
    /// Fetched by the transport from a URL.
    Url { url: String },
    /// Inline base64 data.
    Base64 { data: String, mime_type: String },
}

/// Presence states used for lightweight protocol traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Composing,
    Paused,
}

/// Content the bot sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Image {
        media: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Document {
        media: MediaSource,
        file_name: String,
    },
    Presence { state: Presence },
}

impl MessagePayload {
    /// Plain text payload without mentions.
    pub fn text(text: impl Into<String>) -> Self {
        MessagePayload::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    /// Whether this payload carries media.
    pub fn is_rich_media(&self) -> bool {
        matches!(
            self,
            MessagePayload::Image { .. } | MessagePayload::Document { .. }
        )
    }
}

/// A reply waiting for the session to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReply {
    pub destination: ConversationId,
    pub payload: MessagePayload,
}

/// Emoji reaction to an existing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub conversation: ConversationId,
    pub message_id: String,
    pub sender: String,
    /// Empty when the reaction was removed.
    #[serde(default)]
    pub emoji: String,
}

/// What happened to group participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Participants joined, left or changed role in a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMembershipChange {
    pub conversation: ConversationId,
    pub action: MembershipAction,
    pub participants: Vec<String>,
}
