//! Background drivers that run one chat turn against a gateway
//!
//! Each driver owns nothing but its request; everything it learns is reported
//! as [`ChatEvent`]s tagged with the turn id, in the order the gateway produced it.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::ai::{ChatRequest, ModelGateway};
use crate::events::{ChatEvent, EventSink};

/// How a chat turn is requested from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Fragments are rendered as they arrive
    #[default]
    Stream,
    /// One request, one complete reply with usage stats
    Generate,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Stream => "stream",
            ChatMode::Generate => "generate",
        }
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "streaming" => Ok(ChatMode::Stream),
            "generate" | "oneshot" | "one-shot" => Ok(ChatMode::Generate),
            other => Err(format!("unknown chat mode '{}' (expected stream or generate)", other)),
        }
    }
}

/// Start a chat turn in the requested mode
pub fn spawn_turn(
    mode: ChatMode,
    gateway: Arc<dyn ModelGateway>,
    turn: u64,
    request: ChatRequest,
    sink: EventSink<ChatEvent>,
) -> JoinHandle<()> {
    match mode {
        ChatMode::Stream => spawn_chat_stream(gateway, turn, request, sink),
        ChatMode::Generate => spawn_generate(gateway, turn, request, sink),
    }
}

/// Stream a reply fragment by fragment; stops at the first error
pub fn spawn_chat_stream(
    gateway: Arc<dyn ModelGateway>,
    turn: u64,
    request: ChatRequest,
    sink: EventSink<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(turn, gateway = gateway.name(), model = %request.model, "opening chat stream");
        let mut stream = match gateway.stream_chat(request).await {
            Ok(stream) => stream,
            Err(err) => {
                sink(ChatEvent::Failed {
                    turn,
                    error: err.to_string(),
                });
                return;
            }
        };

        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    fragments += 1;
                    sink(ChatEvent::Fragment { turn, text });
                }
                Err(err) => {
                    sink(ChatEvent::Failed {
                        turn,
                        error: err.to_string(),
                    });
                    return;
                }
            }
        }

        debug!(turn, fragments, "chat stream ended");
        sink(ChatEvent::Finished {
            turn,
            usage: None,
            finish_reason: None,
        });
    })
}

/// Request a complete reply in one call and report it as a single fragment
pub fn spawn_generate(
    gateway: Arc<dyn ModelGateway>,
    turn: u64,
    request: ChatRequest,
    sink: EventSink<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(turn, gateway = gateway.name(), model = %request.model, "requesting generation");
        match gateway.generate(request).await {
            Ok(generation) => {
                sink(ChatEvent::Fragment {
                    turn,
                    text: generation.text,
                });
                sink(ChatEvent::Finished {
                    turn,
                    usage: Some(generation.usage),
                    finish_reason: generation.finish_reason,
                });
            }
            Err(err) => sink(ChatEvent::Failed {
                turn,
                error: err.to_string(),
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fake::FakeGateway;
    use crate::ai::GatewayMessage;
    use crate::events::channel_sink;
    use crate::session::ChatSession;
    use crate::state::RequestStatus;
    use tokio::sync::mpsc;

    fn request(history: Vec<GatewayMessage>) -> ChatRequest {
        ChatRequest {
            model: "fake-model".to_string(),
            system: Some("system".to_string()),
            messages: history,
        }
    }

    async fn run_turn(mode: ChatMode, gateway: FakeGateway) -> (ChatSession, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
        let mut session = ChatSession::new();

        let turn = session.send("Hello").unwrap();
        let handle = spawn_turn(mode, gateway.clone(), turn.id, request(turn.history), channel_sink(tx));
        handle.await.unwrap();

        while let Ok(event) = rx.try_recv() {
            session.apply(event);
        }
        (session, gateway)
    }

    #[tokio::test]
    async fn test_streamed_turn_renders_all_fragments() {
        let (session, gateway) = run_turn(ChatMode::Stream, FakeGateway::streaming(&["Hi", " there", "!"])).await;

        assert_eq!(session.status(), RequestStatus::Ready);
        let reply = &session.transcript().messages()[1];
        assert_eq!(reply.text(), "Hi there!");
        assert_eq!(reply.parts().len(), 3);

        let requests = gateway.chat_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![GatewayMessage::user("Hello")]);
    }

    #[tokio::test]
    async fn test_stream_failure_mid_response() {
        let gateway = FakeGateway {
            fragments: vec![Ok("Par".to_string()), Err("connection reset".to_string()), Ok("tial".to_string())],
            ..Default::default()
        };
        let (mut session, _) = run_turn(ChatMode::Stream, gateway).await;

        assert_eq!(session.status(), RequestStatus::Error);
        assert_eq!(session.transcript().messages()[1].text(), "Par");
        let surfaced = session.acknowledge_error().unwrap();
        assert!(surfaced.contains("connection reset"));
        assert_eq!(session.status(), RequestStatus::Idle);
        assert!(session.send("retry").is_ok());
    }

    #[tokio::test]
    async fn test_generate_turn_records_usage() {
        let (session, _) = run_turn(ChatMode::Generate, FakeGateway::streaming(&["Hello", " back"])).await;

        assert_eq!(session.status(), RequestStatus::Ready);
        assert_eq!(session.transcript().messages()[1].text(), "Hello back");
        assert_eq!(session.last_usage().and_then(|u| u.total()), Some(6));
        assert_eq!(session.last_finish_reason(), Some("stop"));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("Stream".parse::<ChatMode>(), Ok(ChatMode::Stream));
        assert_eq!("generate".parse::<ChatMode>(), Ok(ChatMode::Generate));
        assert!("batch".parse::<ChatMode>().is_err());
    }
}
