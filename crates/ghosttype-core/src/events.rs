//! Events fed back into the single-threaded state owners
//!
//! Background tasks (debounce timers, gateway requests) never touch state
//! directly. They report through an [`EventSink`] and the owner applies each
//! event as one atomic step on its own event loop.

use std::sync::Arc;

use crate::ai::Usage;
use crate::error::GatewayError;

/// Callback used by background tasks to hand events back to the event loop
pub type EventSink<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Build a sink that forwards into an unbounded channel, dropping events once the receiver is gone
pub fn channel_sink<E, T>(tx: tokio::sync::mpsc::UnboundedSender<T>) -> EventSink<E>
where
    E: Send + 'static,
    T: From<E> + Send + 'static,
{
    Arc::new(move |event: E| {
        let _ = tx.send(T::from(event));
    })
}

/// Progress of one chat turn
#[derive(Debug)]
pub enum ChatEvent {
    Fragment { turn: u64, text: String },
    Finished {
        turn: u64,
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    Failed { turn: u64, error: String },
}

impl ChatEvent {
    pub fn turn(&self) -> u64 {
        match self {
            ChatEvent::Fragment { turn, .. }
            | ChatEvent::Finished { turn, .. }
            | ChatEvent::Failed { turn, .. } => *turn,
        }
    }
}

/// Timer fires and fetch completions of the suggestion controller
#[derive(Debug)]
pub enum SuggestionEvent {
    /// Quiet period elapsed for the query issued under `request_id`
    DebounceElapsed { request_id: u64, query: String },
    /// Completion fetch for `request_id` finished
    Resolved {
        request_id: u64,
        result: Result<String, GatewayError>,
    },
}

impl SuggestionEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            SuggestionEvent::DebounceElapsed { request_id, .. }
            | SuggestionEvent::Resolved { request_id, .. } => *request_id,
        }
    }
}
