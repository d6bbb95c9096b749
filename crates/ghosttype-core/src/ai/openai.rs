use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    check_status, http_client, into_fragments, ChatRequest, CompletionRequest, FragmentStream,
    GatewayMessage, Generation, ModelGateway, StreamItem, Usage,
};
use crate::error::GatewayError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

/// Decode one SSE `data:` payload of a streamed chat completion
fn parse_stream_data(data: &str) -> Result<StreamItem, GatewayError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamItem::Done);
    }
    if let Ok(envelope) = serde_json::from_str::<OpenAIErrorEnvelope>(data) {
        return Err(GatewayError::Provider(envelope.error.message));
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(data)?;
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect::<String>();
    Ok(StreamItem::Text(text))
}

fn to_openai_messages(system: Option<&str>, messages: &[GatewayMessage]) -> Vec<OpenAIMessage> {
    system
        .map(|content| OpenAIMessage {
            role: "system".to_string(),
            content: content.to_string(),
        })
        .into_iter()
        .chain(messages.iter().map(|m| OpenAIMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }))
        .collect()
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
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
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-3.5-turbo".to_string(),
        ]
    }

    async fn post(&self, request: &OpenAIRequest) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        check_status("openai", response).await
    }
}

#[async_trait]
impl ModelGateway for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        let body = OpenAIRequest {
            model: request.model,
            messages: to_openai_messages(Some(&request.system), &[GatewayMessage::user(request.prompt)]),
            stream: false,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
        };

        let response: OpenAIResponse = self.post(&body).await?.json().await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, GatewayError> {
        let body = OpenAIRequest {
            model: request.model,
            messages: to_openai_messages(request.system.as_deref(), &request.messages),
            stream: true,
            temperature: None,
            max_tokens: None,
        };

        let response = self.post(&body).await?;
        let items = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => parse_stream_data(&event.data),
            Err(err) => Err(GatewayError::Transport(err.to_string())),
        });

        Ok(into_fragments(items))
    }

    async fn generate(&self, request: ChatRequest) -> Result<Generation, GatewayError> {
        let body = OpenAIRequest {
            model: request.model,
            messages: to_openai_messages(request.system.as_deref(), &request.messages),
            stream: false,
            temperature: None,
            max_tokens: None,
        };

        let response: OpenAIResponse = self.post(&body).await?.json().await?;
        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: Some(u.prompt_tokens),
                output_tokens: Some(u.completion_tokens),
            })
            .unwrap_or_default();
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed("response has no choices".to_string()))?;

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        Ok(Self::known_models())
    }
}
