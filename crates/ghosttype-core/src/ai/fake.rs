//! Scripted gateway for controller and driver tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::{ChatRequest, CompletionRequest, FragmentStream, Generation, ModelGateway, Usage};
use crate::error::GatewayError;

#[derive(Default)]
pub(crate) struct FakeGateway {
    /// Reply for every completion; `None` makes completions fail
    pub completion_reply: Option<String>,
    pub completion_delay: Duration,
    pub fragments: Vec<Result<String, String>>,
    pub completion_queries: Mutex<Vec<String>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
}

impl FakeGateway {
    pub fn replying(reply: &str) -> Self {
        Self {
            completion_reply: Some(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn streaming(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.completion_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        self.completion_queries.lock().unwrap().push(request.prompt.clone());
        if !self.completion_delay.is_zero() {
            tokio::time::sleep(self.completion_delay).await;
        }
        self.completion_reply
            .clone()
            .ok_or_else(|| GatewayError::Transport("connection refused".to_string()))
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, GatewayError> {
        self.chat_requests.lock().unwrap().push(request);
        let items: Vec<Result<String, GatewayError>> = self
            .fragments
            .iter()
            .map(|f| f.clone().map_err(GatewayError::Transport))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    async fn generate(&self, request: ChatRequest) -> Result<Generation, GatewayError> {
        self.chat_requests.lock().unwrap().push(request);
        let mut text = String::new();
        for fragment in &self.fragments {
            match fragment {
                Ok(f) => text.push_str(f),
                Err(e) => return Err(GatewayError::Transport(e.clone())),
            }
        }
        Ok(Generation {
            text,
            usage: Usage {
                input_tokens: Some(4),
                output_tokens: Some(2),
            },
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        Ok(vec!["fake-model".to_string()])
    }
}
