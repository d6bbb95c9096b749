use anyhow::{Context, Result};
use std::path::Path;

/// System prompt for chat turns when no prompt file is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, concise assistant. \
Answer clearly, use short paragraphs, and say so when you are unsure.";

/// System prompt for inline suggestions: the model must answer with the continuation only
pub const COMPLETION_SYSTEM_PROMPT: &str = "You suggest completions for text the user is typing. \
Continue the user's text naturally with a few words. \
REPLY ONLY WITH THE WORDS THAT SHOULD GO AFTER THE PROMPT. \
Do not repeat the prompt, do not add quotes, explanations or anything else.";

/// Read the chat system prompt from `path`, or fall back to the built-in one
pub fn load_system_prompt(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };

    let prompt = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    }
    Ok(prompt.to_string())
}
