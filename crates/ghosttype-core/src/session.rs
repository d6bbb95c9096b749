//! Chat turn state machine
//!
//! `Idle -> Submitted` on send, `Submitted -> Streaming` on the first fragment,
//! `-> Ready` on end of stream, `-> Error` on failure. An error is surfaced once
//! through [`ChatSession::acknowledge_error`] and the session drops back to `Idle`.
//! A failed reply keeps whatever text already arrived.

use tracing::{debug, error, info};

use crate::ai::{GatewayMessage, Usage};
use crate::error::SendRejected;
use crate::events::ChatEvent;
use crate::state::{RequestStatus, Transcript};

/// Accepted submission: the turn id to tag gateway events with, and the history to send
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: u64,
    pub history: Vec<GatewayMessage>,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Transcript,
    status: RequestStatus,
    turn: u64,
    last_error: Option<String>,
    last_usage: Option<Usage>,
    last_finish_reason: Option<String>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn current_turn(&self) -> u64 {
        self.turn
    }

    pub fn last_usage(&self) -> Option<Usage> {
        self.last_usage
    }

    pub fn last_finish_reason(&self) -> Option<&str> {
        self.last_finish_reason.as_deref()
    }

    /// Record a user message and open an empty assistant reply
    pub fn send(&mut self, text: &str) -> Result<Turn, SendRejected> {
        if !self.status.accepts_submission() {
            return Err(SendRejected::Busy(self.status));
        }
        if text.trim().is_empty() {
            return Err(SendRejected::Empty);
        }

        self.transcript.push_user(text);
        let history = self.transcript.history();
        self.transcript.open_assistant();

        self.turn += 1;
        self.status = RequestStatus::Submitted;
        self.last_usage = None;
        self.last_finish_reason = None;
        info!(turn = self.turn, messages = history.len(), "chat turn submitted");

        Ok(Turn {
            id: self.turn,
            history,
        })
    }

    /// Append a streamed fragment to the open reply
    pub fn fragment(&mut self, text: &str) -> bool {
        if !self.transcript.append_to_open(text) {
            debug!("fragment arrived with no open message, dropped");
            return false;
        }
        if self.status == RequestStatus::Submitted {
            self.status = RequestStatus::Streaming;
        }
        true
    }

    /// Close the open reply. Calling it again changes nothing.
    pub fn finish(&mut self) {
        if self.transcript.close_open() {
            self.status = RequestStatus::Ready;
            info!(turn = self.turn, "chat turn finished");
        }
    }

    /// Close the open reply with its partial content and enter `Error`
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.transcript.close_open() {
            return;
        }
        let message = message.into();
        error!(turn = self.turn, "chat turn failed: {}", message);
        self.last_error = Some(message);
        self.status = RequestStatus::Error;
    }

    /// Surface the pending error once and return to `Idle`
    pub fn acknowledge_error(&mut self) -> Option<String> {
        if self.status != RequestStatus::Error {
            return None;
        }
        self.status = RequestStatus::Idle;
        self.last_error.take()
    }

    /// Apply a gateway event; events from an older turn are ignored
    pub fn apply(&mut self, event: ChatEvent) {
        if event.turn() != self.turn {
            debug!(turn = event.turn(), current = self.turn, "stale chat event discarded");
            return;
        }
        match event {
            ChatEvent::Fragment { text, .. } => {
                self.fragment(&text);
            }
            ChatEvent::Finished {
                usage,
                finish_reason,
                ..
            } => {
                if self.transcript.has_open() {
                    self.last_usage = usage;
                    self.last_finish_reason = finish_reason;
                }
                self.finish();
            }
            ChatEvent::Failed { error, .. } => self.fail(error),
        }
    }
}
