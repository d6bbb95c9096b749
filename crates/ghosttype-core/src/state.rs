//! UI-agnostic conversation state types
//!
//! This module contains the transcript data structures shared by every front-end.
//! A message's content is an append-only list of fragments exactly as the gateway
//! delivered them; rendering is a plain concatenation of that list.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai::GatewayMessage;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub created_at: DateTime<Local>,
    parts: Vec<String>,
}

impl ChatMessage {
    fn new(role: ChatRole) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            created_at: Local::now(),
            parts: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        let mut message = Self::new(ChatRole::User);
        message.parts.push(text.into());
        message
    }

    pub fn assistant() -> Self {
        Self::new(ChatRole::Assistant)
    }

    /// Fragments in arrival order
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Full text: every fragment concatenated in order, nothing added in between
    pub fn text(&self) -> String {
        self.parts.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.is_empty())
    }
}

/// Ordered conversation history. At most one message is open at a time.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.close_open();
        self.messages.push(ChatMessage::user(text));
        &self.messages[self.messages.len() - 1]
    }

    /// Start a new empty assistant message that receives streamed fragments
    pub fn open_assistant(&mut self) -> &ChatMessage {
        self.messages.push(ChatMessage::assistant());
        let idx = self.messages.len() - 1;
        self.open = Some(idx);
        &self.messages[idx]
    }

    pub fn open_message(&self) -> Option<&ChatMessage> {
        self.open.and_then(|i| self.messages.get(i))
    }

    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    /// Append a fragment to the open message. Returns false when nothing is open.
    pub fn append_to_open(&mut self, fragment: &str) -> bool {
        match self.open.and_then(|i| self.messages.get_mut(i)) {
            Some(message) => {
                message.parts.push(fragment.to_string());
                true
            }
            None => false,
        }
    }

    /// Close the open message. Returns false when nothing was open.
    pub fn close_open(&mut self) -> bool {
        self.open.take().is_some()
    }

    /// Closed, non-empty messages in chronological order, ready for a gateway request
    pub fn history(&self) -> Vec<GatewayMessage> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(i, m)| Some(*i) != self.open && !m.is_empty())
            .map(|(_, m)| GatewayMessage::from(m))
            .collect()
    }
}

/// Lifecycle of the current chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Idle,
    Submitted,
    Streaming,
    Ready,
    Error,
}

impl RequestStatus {
    /// New submissions are only taken when nothing is in flight
    pub fn accepts_submission(&self) -> bool {
        matches!(self, RequestStatus::Idle | RequestStatus::Ready)
    }

    /// Whether a loading indicator should be shown
    pub fn is_busy(&self) -> bool {
        matches!(self, RequestStatus::Submitted | RequestStatus::Streaming)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Idle => "idle",
            RequestStatus::Submitted => "submitted",
            RequestStatus::Streaming => "streaming",
            RequestStatus::Ready => "ready",
            RequestStatus::Error => "error",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline suggestion bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionState {
    pub query_text: String,
    pub suggestion: Option<String>,
    /// Bumped on every keystroke, submit and cancel; results tagged with an older id are stale
    pub request_id: u64,
    pub pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GatewayRole;

    #[test]
    fn test_text_concatenates_parts_in_order() {
        let mut transcript = Transcript::new();
        transcript.open_assistant();
        for part in ["Hi", " there", "!", "", " \n"] {
            assert!(transcript.append_to_open(part));
        }
        let message = transcript.open_message().unwrap();
        assert_eq!(message.parts().len(), 5);
        assert_eq!(message.text(), "Hi there! \n");
    }

    #[test]
    fn test_append_after_close_is_rejected() {
        let mut transcript = Transcript::new();
        transcript.open_assistant();
        transcript.append_to_open("a");
        assert!(transcript.close_open());
        assert!(!transcript.close_open());
        assert!(!transcript.append_to_open("b"));
        assert_eq!(transcript.messages()[0].text(), "a");
    }

    #[test]
    fn test_history_skips_open_and_empty_messages() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello");
        transcript.open_assistant();
        transcript.close_open();
        transcript.push_user("Again");
        transcript.open_assistant();
        transcript.append_to_open("partial");

        let history = transcript.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, GatewayRole::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].content, "Again");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = ChatMessage::user("x");
        let b = ChatMessage::user("x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_gates() {
        assert!(RequestStatus::Idle.accepts_submission());
        assert!(RequestStatus::Ready.accepts_submission());
        assert!(!RequestStatus::Submitted.accepts_submission());
        assert!(!RequestStatus::Streaming.accepts_submission());
        assert!(!RequestStatus::Error.accepts_submission());
        assert!(RequestStatus::Submitted.is_busy());
        assert!(RequestStatus::Streaming.is_busy());
        assert!(!RequestStatus::Ready.is_busy());
    }
}
