//! Wire types for the conversation endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::thread::ConversationThread;

/// Body of `POST /backend-api/conversation`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRequest {
    pub action: String,
    pub messages: Vec<OutgoingMessage>,
    pub model: String,
    pub conversation_id: Option<String>,
    pub parent_message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub id: String,
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    pub content_type: String,
    pub parts: Vec<Value>,
}

impl ConversationRequest {
    /// A user turn continuing `thread`, under a freshly generated message id.
    pub fn next(prompt: &str, model: &str, thread: &ConversationThread) -> Self {
        Self {
            action: "next".into(),
            messages: vec![OutgoingMessage {
                id: uuid::Uuid::new_v4().to_string(),
                role: "user".into(),
                content: MessageContent {
                    content_type: "text".into(),
                    parts: vec![Value::String(prompt.to_string())],
                },
            }],
            model: model.to_string(),
            conversation_id: thread.conversation_id.clone(),
            parent_message_id: thread.parent_message_id.clone(),
        }
    }
}

/// One decoded snapshot of the remote reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub message_id: String,
    pub conversation_id: String,
    pub full_text: String,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    message: Option<RawMessage>,
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    author: Option<RawAuthor>,
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    role: String,
}

impl StreamEvent {
    /// Decode one `data:` payload.
    ///
    /// `Ok(None)` for events that carry no assistant message (moderation
    /// notices, echoes of the user turn). Anything that is not the expected
    /// shape is an error.
    pub fn decode(payload: &str) -> serde_json::Result<Option<Self>> {
        let raw: RawEvent = serde_json::from_str(payload)?;
        let Some(message) = raw.message else {
            return Ok(None);
        };
        if let Some(author) = &message.author {
            if author.role != "assistant" {
                return Ok(None);
            }
        }
        let Some(conversation_id) = raw.conversation_id else {
            return Ok(None);
        };

        let full_text = message
            .content
            .parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Some(Self {
            message_id: message.id,
            conversation_id,
            full_text,
        }))
    }
}

/// A complete reply together with the thread it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub thread: ConversationThread,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let thread = ConversationThread {
            conversation_id: Some("conv-1".into()),
            parent_message_id: "parent-1".into(),
        };
        let request = ConversationRequest::next("Hello", "model-x", &thread);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["action"], "next");
        assert_eq!(json["model"], "model-x");
        assert_eq!(json["conversation_id"], "conv-1");
        assert_eq!(json["parent_message_id"], "parent-1");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"]["content_type"], "text");
        assert_eq!(json["messages"][0]["content"]["parts"][0], "Hello");
        assert_eq!(json["messages"][0]["id"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_fresh_thread_sends_null_conversation() {
        let request = ConversationRequest::next("Hi", "m", &ConversationThread::new());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["conversation_id"].is_null());
    }

    #[test]
    fn test_decode_assistant_event() {
        let payload = r#"{"message":{"id":"m1","author":{"role":"assistant"},"content":{"content_type":"text","parts":["Hello","world"]}},"conversation_id":"c1","error":null}"#;
        let event = StreamEvent::decode(payload).unwrap().unwrap();
        assert_eq!(event.message_id, "m1");
        assert_eq!(event.conversation_id, "c1");
        assert_eq!(event.full_text, "Hello\nworld");
    }

    #[test]
    fn test_decode_skips_non_message_events() {
        assert!(StreamEvent::decode(r#"{"type":"moderation","conversation_id":"c1"}"#)
            .unwrap()
            .is_none());
        let user_echo = r#"{"message":{"id":"u1","author":{"role":"user"},"content":{"content_type":"text","parts":["q"]}},"conversation_id":"c1"}"#;
        assert!(StreamEvent::decode(user_echo).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(StreamEvent::decode("{not json").is_err());
        assert!(StreamEvent::decode(r#"{"message":{"id":"m1"},"conversation_id":"c"}"#).is_err());
    }
}
