pub mod ai;
pub mod config;
pub mod error;
pub mod events;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod state;
pub mod stream;
pub mod suggest;

// Re-export main types for convenience
pub use ai::{build_gateway, ChatRequest, ClaudeClient, GatewayMessage, ModelGateway, OllamaClient, OpenAIClient};
pub use config::Config;
pub use error::{GatewayError, SendRejected};
pub use events::{channel_sink, ChatEvent, EventSink, SuggestionEvent};
pub use provider::Provider;
pub use session::{ChatSession, Turn};
pub use state::{ChatMessage, ChatRole, RequestStatus, SuggestionState, Transcript};
pub use stream::{spawn_turn, ChatMode};
pub use suggest::{SuggestionController, SuggestionSettings};
