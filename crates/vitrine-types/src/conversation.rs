//! Conversation addressing.
//!
//! A `ConversationId` is the protocol-level address of a chat target. Group
//! conversations carry the `@g.us` suffix; everything else is a direct chat.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address suffix used by group conversations.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Addressable chat target (direct or group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this conversation is a group chat.
    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
