use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ghosttype_core::ai::{ChatRequest, CompletionRequest};
use ghosttype_core::prompts::load_system_prompt;
use ghosttype_core::{
    build_gateway, channel_sink, spawn_turn, ChatEvent, ChatMode, ChatSession, Config, Provider,
};
use std::io::Write;
use tokio::sync::mpsc;

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::{App, AppOptions};
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "ghosttype", version)]
#[command(about = "Terminal chat with debounced inline suggestions")]
struct Cli {
    /// Model provider (ollama, claude, openai)
    #[arg(short, long, global = true)]
    provider: Option<Provider>,
    /// Chat model to use
    #[arg(short, long, global = true)]
    model: Option<String>,
    /// Reply mode (stream or generate)
    #[arg(long, global = true)]
    mode: Option<ChatMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send one message and print the reply
    Ask {
        /// Message text
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Print the inline suggestion for a piece of text
    Complete {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List models available from the provider
    Models,
    /// Save the default chat model
    UseModel {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    if !matches!(command, Commands::Chat) {
        logging::init_stderr_logging();
    }

    let mut config = Config::load().unwrap_or_else(|err| {
        eprintln!("Ignoring config file: {}", err);
        Config::new()
    });
    apply_overrides(&mut config, cli.provider, cli.model, cli.mode);

    match command {
        Commands::Chat => run_tui(config).await,
        Commands::Ask { prompt } => ask(&config, &prompt.join(" ")).await,
        Commands::Complete { text } => complete(&config, &text.join(" ")).await,
        Commands::Models => list_models(&config).await,
        Commands::UseModel { name } => {
            Config::save_default_model(&name)?;
            println!("Default chat model set to {}", name);
            Ok(())
        }
    }
}

/// Command-line flags win over the config file. Switching provider drops models
/// that were chosen for the old one.
fn apply_overrides(
    config: &mut Config,
    provider: Option<Provider>,
    model: Option<String>,
    mode: Option<ChatMode>,
) {
    if let Some(provider) = provider {
        if provider != config.provider() {
            config.chat_model = None;
            if config.completion_provider.is_none() {
                config.completion_model = None;
            }
        }
        config.provider = Some(provider.as_str().to_string());
    }
    if let Some(model) = model {
        config.chat_model = Some(model);
    }
    if let Some(mode) = mode {
        config.mode = Some(mode.as_str().to_string());
    }
}

fn app_options(config: &Config) -> Result<AppOptions> {
    let provider = config.provider();
    let chat_gateway = build_gateway(provider, config)
        .with_context(|| format!("Cannot use {} for chat", provider.display_name()))?;
    let completion_provider = config.completion_provider();
    let completion_gateway = build_gateway(completion_provider, config).with_context(|| {
        format!("Cannot use {} for suggestions", completion_provider.display_name())
    })?;

    Ok(AppOptions {
        provider,
        chat_model: config.chat_model(),
        mode: config.mode(),
        system_prompt: load_system_prompt(config.system_prompt_path.as_deref())?,
        chat_gateway,
        completion_gateway,
        suggestion_settings: config.suggestion_settings(),
    })
}

async fn run_tui(config: Config) -> Result<()> {
    let _log_guard = logging::init_file_logging()?;
    let options = app_options(&config)?;
    tracing::info!(
        provider = options.provider.as_str(),
        model = %options.chat_model,
        mode = options.mode.as_str(),
        "starting chat"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(options, events.sender());

    let result = run_loop(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;
        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}

/// One chat turn through the same session and drivers the TUI uses
async fn ask(config: &Config, prompt: &str) -> Result<()> {
    let gateway = build_gateway(config.provider(), config)?;
    let system = load_system_prompt(config.system_prompt_path.as_deref())?;

    let mut session = ChatSession::new();
    let turn = session.send(prompt)?;
    let request = ChatRequest {
        model: config.chat_model(),
        system: Some(system),
        messages: turn.history,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
    let _task = spawn_turn(config.mode(), gateway, turn.id, request, channel_sink(tx));

    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let done = !matches!(event, ChatEvent::Fragment { .. });
        if let ChatEvent::Fragment { text, .. } = &event {
            write!(stdout, "{}", text)?;
            stdout.flush()?;
        }
        session.apply(event);
        if done {
            break;
        }
    }
    writeln!(stdout)?;

    if let Some(error) = session.acknowledge_error() {
        anyhow::bail!(error);
    }
    if let Some(usage) = session.last_usage() {
        if let Some(total) = usage.total() {
            eprintln!("{} tokens", total);
        }
    }
    Ok(())
}

async fn complete(config: &Config, text: &str) -> Result<()> {
    let gateway = build_gateway(config.completion_provider(), config)?;
    let settings = config.suggestion_settings();
    let suggestion = gateway
        .complete(CompletionRequest {
            model: settings.model,
            system: settings.system_prompt,
            prompt: text.to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
        .await?;

    println!("{}", suggestion.trim());
    Ok(())
}

/// Provider name with where its credentials come from
fn provider_label(config: &Config, provider: Provider) -> String {
    match (provider, config.api_key_source(provider)) {
        (Provider::Ollama, _) => format!("{} at {}", provider.display_name(), config.ollama_url()),
        (_, Some(source)) => format!("{} (key from {})", provider.display_name(), source),
        (_, None) => format!("{} (no API key)", provider.display_name()),
    }
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = config.provider();
    let gateway = build_gateway(provider, config)?;
    let models = gateway.list_models().await?;
    let current = config.chat_model();

    if models.is_empty() {
        println!("No models available from {}", provider.display_name());
        return Ok(());
    }

    println!("Models from {}:", provider_label(config, provider));
    for model in models {
        let marker = if model == current { "*" } else { " " };
        println!(" {} {}", marker, model);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_chat() {
        let cli = Cli::try_parse_from(["ghosttype"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.provider.is_none());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ghosttype", "ask", "hello", "there", "--provider", "openai", "--mode", "generate"])
            .unwrap();
        assert_eq!(cli.provider, Some(Provider::OpenAI));
        assert_eq!(cli.mode, Some(ChatMode::Generate));
        match cli.command {
            Some(Commands::Ask { prompt }) => assert_eq!(prompt.join(" "), "hello there"),
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["ghosttype", "--provider", "gemini"]).is_err());
    }

    #[test]
    fn test_provider_override_resets_models() {
        let mut config = Config {
            provider: Some("ollama".to_string()),
            chat_model: Some("llama3.2:latest".to_string()),
            completion_model: Some("llama3.2:latest".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut config, Some(Provider::OpenAI), None, None);

        assert_eq!(config.provider(), Provider::OpenAI);
        assert_eq!(config.chat_model(), "gpt-4o");
        assert_eq!(config.completion_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_provider_label_shows_key_source() {
        let config = Config {
            openai_api_key: Some("sk-test".to_string()),
            ..Config::new()
        };
        assert_eq!(
            provider_label(&config, Provider::Ollama),
            "Ollama (Local) at http://localhost:11434"
        );
        let label = provider_label(&config, Provider::OpenAI);
        assert!(label == "ChatGPT (OpenAI) (key from config)" || label == "ChatGPT (OpenAI) (key from env)");
    }

    #[test]
    fn test_model_and_mode_override() {
        let mut config = Config::new();
        apply_overrides(&mut config, Some(Provider::Ollama), Some("qwen3:8b".to_string()), Some(ChatMode::Generate));

        assert_eq!(config.chat_model(), "qwen3:8b");
        assert_eq!(config.mode(), ChatMode::Generate);
    }
}
