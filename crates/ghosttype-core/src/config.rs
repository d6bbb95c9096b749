use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::Provider;
use crate::stream::ChatMode;
use crate::suggest::{SuggestionSettings, DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_CHARS};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Upper bound for a whole gateway request, streamed replies included
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub chat_model: Option<String>,
    /// Provider used for inline suggestions; defaults to `provider`
    pub completion_provider: Option<String>,
    pub completion_model: Option<String>,
    pub ollama_url: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub min_query_chars: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub mode: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("ollama".to_string()),
            ..Default::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.chat_model = Some(model.to_string());
        config.save()
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("ghosttype").join("config.json"))
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(Provider::Ollama)
    }

    pub fn completion_provider(&self) -> Provider {
        self.completion_provider
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| self.provider())
    }

    pub fn chat_model(&self) -> String {
        self.chat_model
            .clone()
            .unwrap_or_else(|| self.provider().default_chat_model().to_string())
    }

    pub fn completion_model(&self) -> String {
        self.completion_model
            .clone()
            .unwrap_or_else(|| self.completion_provider().default_completion_model().to_string())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    /// API key for a provider: environment first, then the config file
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let from_env = provider
            .api_key_env()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty());

        from_env.or_else(|| match provider {
            Provider::Ollama => None,
            Provider::Claude => self.claude_api_key.clone(),
            Provider::OpenAI => self.openai_api_key.clone(),
        })
    }

    /// Where the key for `provider` came from, for display
    pub fn api_key_source(&self, provider: Provider) -> Option<&'static str> {
        let env_set = provider
            .api_key_env()
            .map(|name| std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false))
            .unwrap_or(false);
        if env_set {
            return Some("env");
        }
        let in_file = match provider {
            Provider::Ollama => false,
            Provider::Claude => self.claude_api_key.is_some(),
            Provider::OpenAI => self.openai_api_key.is_some(),
        };
        in_file.then_some("config")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
            .as_deref()
            .and_then(|m| m.parse().ok())
            .unwrap_or_default()
    }

    pub fn suggestion_settings(&self) -> SuggestionSettings {
        let mut settings = SuggestionSettings::new(self.completion_model());
        settings.debounce = self
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        settings.min_query_chars = self.min_query_chars.unwrap_or(DEFAULT_MIN_QUERY_CHARS);
        settings
    }
}
