use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    check_status, http_client, into_fragments, ChatRequest, CompletionRequest, FragmentStream,
    GatewayMessage, Generation, ModelGateway, StreamItem, Usage,
};
use crate::error::GatewayError;

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&GatewayMessage> for OllamaMessage {
    fn from(message: &GatewayMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// One NDJSON line of `/api/chat`, streamed or not
#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Splits a byte stream into complete lines, holding partial lines across chunks
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Take the last line when the stream ends without a trailing newline
    fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        if line.is_empty() {
            Vec::new()
        } else {
            vec![line]
        }
    }
}

fn parse_chat_line(line: &str) -> Vec<Result<StreamItem, GatewayError>> {
    let chunk: OllamaChatChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(err) => return vec![Err(GatewayError::from(err))],
    };

    if let Some(error) = chunk.error {
        return vec![Err(GatewayError::Provider(error))];
    }

    let mut items = Vec::new();
    if let Some(message) = chunk.message {
        items.push(Ok(StreamItem::Text(message.content)));
    }
    if chunk.done {
        items.push(Ok(StreamItem::Done));
    }
    items
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages: Vec<OllamaMessage> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(OllamaMessage::from));

        let body = OllamaChatRequest {
            model: request.model.clone(),
            messages,
            stream,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        check_status("ollama", response).await
    }
}

#[async_trait]
impl ModelGateway for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaGenerateRequest {
            model: request.model,
            prompt: request.prompt,
            system: request.system,
            stream: false,
            options: OllamaOptions {
                temperature: Some(request.temperature),
                num_predict: Some(request.max_tokens),
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_status("ollama", response).await?;

        let generated: OllamaGenerateResponse = response.json().await?;
        Ok(generated.response)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, GatewayError> {
        let response = self.post_chat(&request, true).await?;

        let mut lines = LineBuffer::default();
        // `None` marks end of body so an unterminated last line is still parsed
        let items = response
            .bytes_stream()
            .map(Some)
            .chain(futures_util::stream::once(async { None }))
            .map(move |chunk| {
                let complete = match chunk {
                    Some(Ok(bytes)) => lines.push(&bytes),
                    Some(Err(err)) => return vec![Err(GatewayError::from(err))],
                    None => lines.finish(),
                };
                complete
                    .iter()
                    .flat_map(|line| parse_chat_line(line))
                    .collect::<Vec<_>>()
            })
            .flat_map(futures_util::stream::iter);

        Ok(into_fragments(items))
    }

    async fn generate(&self, request: ChatRequest) -> Result<Generation, GatewayError> {
        let response = self.post_chat(&request, false).await?;
        let chunk: OllamaChatChunk = response.json().await?;

        if let Some(error) = chunk.error {
            return Err(GatewayError::Provider(error));
        }

        Ok(Generation {
            text: chunk.message.map(|m| m.content).unwrap_or_default(),
            usage: Usage {
                input_tokens: chunk.prompt_eval_count,
                output_tokens: chunk.eval_count,
            },
            finish_reason: chunk.done_reason,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;
        let response = check_status("ollama", response).await?;

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}
