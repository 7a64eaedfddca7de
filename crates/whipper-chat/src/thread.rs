//! Conversation thread continuity.

use serde::{Deserialize, Serialize};

use crate::types::StreamEvent;

/// The pair of ids that chains consecutive requests into one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// `None` until the first exchange of the thread succeeds.
    pub conversation_id: Option<String>,
    pub parent_message_id: String,
}

/// Ids a caller may pin for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadOverride {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

impl ConversationThread {
    /// A thread that starts a new conversation.
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            parent_message_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Rebuild from stored ids; a missing parent gets a fresh one.
    pub fn from_parts(conversation_id: Option<String>, parent_message_id: Option<String>) -> Self {
        Self {
            conversation_id: conversation_id.filter(|id| !id.is_empty()),
            parent_message_id: parent_message_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Forget the conversation and start over.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The thread a request should continue: both overrides when both are
    /// given, otherwise this thread's own ids.
    pub fn resolve(&self, overrides: &ThreadOverride) -> ConversationThread {
        match (
            overrides.conversation_id.as_deref().filter(|s| !s.is_empty()),
            overrides.parent_message_id.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(conversation_id), Some(parent_message_id)) => ConversationThread {
                conversation_id: Some(conversation_id.to_string()),
                parent_message_id: parent_message_id.to_string(),
            },
            _ => self.clone(),
        }
    }

    /// Take over the ids the remote side returned.
    pub fn adopt(&mut self, event: &StreamEvent) {
        self.parent_message_id = event.message_id.clone();
        self.conversation_id = Some(event.conversation_id.clone());
    }

    /// As an override pinning exactly this thread.
    pub fn as_override(&self) -> ThreadOverride {
        ThreadOverride {
            conversation_id: self.conversation_id.clone(),
            parent_message_id: Some(self.parent_message_id.clone()),
        }
    }
}

impl Default for ConversationThread {
    fn default() -> Self {
        Self::new()
    }
}
