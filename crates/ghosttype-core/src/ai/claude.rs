use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    check_status, http_client, into_fragments, ChatRequest, CompletionRequest, FragmentStream,
    GatewayMessage, GatewayRole, Generation, ModelGateway, StreamItem, Usage,
};
use crate::error::GatewayError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Deserialize)]
struct ClaudeDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeErrorBody {
    message: String,
}

/// Server-sent event payloads of the Messages streaming API
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    ContentBlockDelta { delta: ClaudeDelta },
    MessageStop,
    Error { error: ClaudeErrorBody },
    #[serde(other)]
    Other,
}

fn parse_stream_data(data: &str) -> Result<StreamItem, GatewayError> {
    match serde_json::from_str::<ClaudeStreamEvent>(data)? {
        ClaudeStreamEvent::ContentBlockDelta { delta } => Ok(StreamItem::Text(delta.text.unwrap_or_default())),
        ClaudeStreamEvent::MessageStop => Ok(StreamItem::Done),
        ClaudeStreamEvent::Error { error } => Err(GatewayError::Provider(error.message)),
        ClaudeStreamEvent::Other => Ok(StreamItem::Text(String::new())),
    }
}

/// Claude takes the system prompt separately and only user/assistant turns in `messages`
fn to_claude_messages(messages: &[GatewayMessage]) -> Vec<ClaudeMessage> {
    messages
        .iter()
        .filter(|m| m.role != GatewayRole::System)
        .map(|m| ClaudeMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn known_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "claude-3-opus-20240229".to_string(),
        ]
    }

    async fn post(&self, request: &ClaudeRequest) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        check_status("claude", response).await
    }

    fn chat_body(request: ChatRequest, stream: bool) -> ClaudeRequest {
        ClaudeRequest {
            model: request.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: to_claude_messages(&request.messages),
            system: request.system,
            temperature: None,
            stream,
        }
    }
}

#[async_trait]
impl ModelGateway for ClaudeClient {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        let body = ClaudeRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            messages: to_claude_messages(&[GatewayMessage::user(request.prompt)]),
            system: Some(request.system),
            temperature: Some(request.temperature),
            stream: false,
        };

        let response: ClaudeResponse = self.post(&body).await?.json().await?;
        Ok(response
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<String>())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, GatewayError> {
        let response = self.post(&Self::chat_body(request, true)).await?;
        let items = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => parse_stream_data(&event.data),
            Err(err) => Err(GatewayError::Transport(err.to_string())),
        });

        Ok(into_fragments(items))
    }

    async fn generate(&self, request: ChatRequest) -> Result<Generation, GatewayError> {
        let response: ClaudeResponse = self.post(&Self::chat_body(request, false)).await?.json().await?;

        Ok(Generation {
            text: response.content.into_iter().filter_map(|c| c.text).collect(),
            usage: response
                .usage
                .map(|u| Usage {
                    input_tokens: Some(u.input_tokens),
                    output_tokens: Some(u.output_tokens),
                })
                .unwrap_or_default(),
            finish_reason: response.stop_reason,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        Ok(Self::known_models())
    }
}
