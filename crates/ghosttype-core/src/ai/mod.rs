//! Model gateway contract and the hosted-provider clients behind it
//!
//! Three request shapes are supported: a one-shot completion used for inline
//! suggestions, a streamed chat turn, and a non-streaming chat generation.

pub mod claude;
pub mod ollama;
pub mod openai;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::GatewayError;
use crate::provider::Provider;
use crate::state::{ChatMessage, ChatRole};

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

/// Ordered text fragments of a streamed reply; the stream ends at end-of-response
pub type FragmentStream = BoxStream<'static, Result<String, GatewayError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayRole {
    System,
    User,
    Assistant,
}

impl GatewayRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayRole::System => "system",
            GatewayRole::User => "user",
            GatewayRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub role: GatewayRole,
    pub content: String,
}

impl GatewayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: GatewayRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: GatewayRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for GatewayMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::User => GatewayRole::User,
            ChatRole::Assistant => GatewayRole::Assistant,
        };
        Self {
            role,
            content: message.text(),
        }
    }
}

/// Request for an inline suggestion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Request for a chat turn (streamed or one-shot)
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<GatewayMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl Usage {
    pub fn total(&self) -> Option<u32> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
        }
    }
}

/// Result of a non-streaming chat generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Provider name for display and logs
    fn name(&self) -> &'static str;

    /// Single suggestion text for a partial input
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError>;

    /// Stream a chat reply as text fragments
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, GatewayError>;

    /// One-shot chat reply with usage stats
    async fn generate(&self, request: ChatRequest) -> Result<Generation, GatewayError>;

    async fn list_models(&self) -> Result<Vec<String>, GatewayError>;
}

/// Build the HTTP client every provider shares: one overall request timeout
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| GatewayError::Transport(format!("cannot build HTTP client: {}", err)))
}

/// Turn a non-success response into a `GatewayError::Status`
pub(crate) async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        provider,
        status,
        body,
    })
}

/// One decoded unit of a provider's streaming wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamItem {
    Text(String),
    Done,
}

/// Cut a decoded stream at its end marker and keep only non-empty text
pub(crate) fn into_fragments<S>(items: S) -> FragmentStream
where
    S: Stream<Item = Result<StreamItem, GatewayError>> + Send + 'static,
{
    Box::pin(
        items
            .take_while(|item| future::ready(!matches!(item, Ok(StreamItem::Done))))
            .filter_map(|item| {
                future::ready(match item {
                    Ok(StreamItem::Text(text)) if !text.is_empty() => Some(Ok(text)),
                    Ok(_) => None,
                    Err(err) => Some(Err(err)),
                })
            }),
    )
}

/// Construct the gateway for a provider from config
pub fn build_gateway(provider: Provider, config: &Config) -> Result<Arc<dyn ModelGateway>, GatewayError> {
    let timeout = config.request_timeout();
    match provider {
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(&config.ollama_url(), timeout)?)),
        Provider::Claude => {
            let key = config
                .api_key(Provider::Claude)
                .ok_or(GatewayError::MissingApiKey(Provider::Claude))?;
            Ok(Arc::new(ClaudeClient::new(&key, timeout)?))
        }
        Provider::OpenAI => {
            let key = config
                .api_key(Provider::OpenAI)
                .ok_or(GatewayError::MissingApiKey(Provider::OpenAI))?;
            Ok(Arc::new(OpenAIClient::new(&key, timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::default().total(), None);
        let usage = Usage {
            input_tokens: Some(12),
            output_tokens: Some(30),
        };
        assert_eq!(usage.total(), Some(42));
        let partial = Usage {
            input_tokens: None,
            output_tokens: Some(5),
        };
        assert_eq!(partial.total(), Some(5));
    }

    #[tokio::test]
    async fn test_into_fragments_stops_at_done() {
        let items = futures_util::stream::iter(vec![
            Ok(StreamItem::Text("a".to_string())),
            Ok(StreamItem::Text(String::new())),
            Ok(StreamItem::Text("b".to_string())),
            Ok(StreamItem::Done),
            Ok(StreamItem::Text("late".to_string())),
        ]);
        let collected: Vec<String> = into_fragments(items)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_into_fragments_forwards_errors() {
        let items = futures_util::stream::iter(vec![
            Ok(StreamItem::Text("Par".to_string())),
            Err(GatewayError::Transport("reset".to_string())),
        ]);
        let collected: Vec<Result<String, GatewayError>> = into_fragments(items).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[1], Err(GatewayError::Transport(_))));
    }

    #[test]
    fn test_http_client_builds_with_timeout() {
        assert!(http_client(Duration::from_millis(250)).is_ok());
    }

    #[test]
    fn test_build_gateway_needs_key_for_hosted_providers() {
        let config = Config {
            claude_api_key: Some("key".to_string()),
            ..Config::new()
        };
        assert!(build_gateway(Provider::Ollama, &config).is_ok());
        assert!(build_gateway(Provider::Claude, &config).is_ok());
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(
                build_gateway(Provider::OpenAI, &config),
                Err(GatewayError::MissingApiKey(Provider::OpenAI))
            ));
        }
    }

    #[test]
    fn test_gateway_message_from_chat_message() {
        let message = ChatMessage::user("hello");
        let converted = GatewayMessage::from(&message);
        assert_eq!(converted, GatewayMessage::user("hello"));
    }
}
