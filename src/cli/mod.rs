//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat_loop;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::cli::chat_loop::{run_ask, run_chat};
use crate::core::client::CompletionClient;
use crate::core::config::io::ConfigError;
use crate::core::config::{SettingError, Settings};
use crate::core::controller::{ChatController, ChatSettings};
use crate::core::error::ChatError;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "chatservice", version)]
#[command(about = "A streaming chat-completion client with independent sessions")]
#[command(
    long_about = "chatservice sends prompts to an OpenAI-compatible chat-completion endpoint \
and streams the reply as it arrives. Each session keeps its own request and response \
history, and you can switch between sessions at any time.\n\n\
Environment Variables:\n\
  CHATSERVICE_API_KEY  API key sent as a bearer token (overrides the stored api-key)\n\
  RUST_LOG             Diagnostic log filter written to stderr (default: warn)\n\n\
Controls:\n\
  Enter              Send the line as a prompt\n\
  Ctrl+C             Cancel the reply in progress, or quit when idle\n\
  /help              Show session commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Completion endpoint to use for this run
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// System message to send for this run
    #[arg(long, global = true, value_name = "TEXT")]
    pub system: Option<String>,

    /// Ask the server for a single, non-streamed reply
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Log request diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send one prompt and print the reply
    Ask {
        /// Prompt text (multiple words are joined with spaces)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (can be multiple words)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Restore a configuration value to its default
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Show the current configuration
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Some(Commands::Set { ref key, ref value }) => {
            let mut settings = load_settings()?;
            let value = value.join(" ");
            let result = settings
                .set(key, &value)
                .and_then(|key| persist(&settings).map(|()| key));
            match result {
                Ok(key) => {
                    println!("✅ Set {key} to: {}", settings.display_value(key));
                    Ok(())
                }
                Err(err) => exit_with(&err),
            }
        }
        Some(Commands::Unset { ref key }) => {
            let mut settings = load_settings()?;
            let result = settings
                .unset(key)
                .and_then(|key| persist(&settings).map(|()| key));
            match result {
                Ok(key) => {
                    println!("✅ Unset {key}");
                    Ok(())
                }
                Err(err) => exit_with(&err),
            }
        }
        Some(Commands::Config) => {
            let settings = load_settings()?;
            if let Ok(path) = Settings::config_path() {
                println!(
                    "Config file: {}",
                    crate::core::config::data::path_display(path)
                );
            }
            settings.print_all();
            Ok(())
        }
        Some(Commands::Ask { ref prompt }) => {
            let controller = build_controller(&args)?;
            let prompt = prompt.join(" ");
            if !run_ask(&controller, &prompt).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Chat) | None => {
            let controller = build_controller(&args)?;
            run_chat(&controller).await
        }
    }
}

fn load_settings() -> Result<Settings, ChatError> {
    Settings::load().map_err(|err: ConfigError| ChatError::Config(err.to_string()))
}

fn persist(settings: &Settings) -> Result<(), SettingError> {
    settings
        .save()
        .map_err(|err| SettingError::ConfigError(err.to_string()))
}

fn exit_with(err: &SettingError) -> Result<(), Box<dyn Error>> {
    err.print();
    std::process::exit(1);
}

/// Stored settings with this run's command-line overrides applied.
pub fn effective_settings(args: &Args, settings: &Settings) -> ChatSettings {
    let mut chat = settings.chat_settings();
    if let Some(endpoint) = &args.endpoint {
        chat.connection.endpoint_url = endpoint.clone();
    }
    if let Some(system) = &args.system {
        chat.generation.system_message = system.clone();
    }
    if args.no_stream {
        chat.generation.stream = false;
    }
    chat
}

fn build_controller(args: &Args) -> Result<ChatController, ChatError> {
    let settings = load_settings()?;
    Ok(ChatController::new(
        CompletionClient::default(),
        effective_settings(args, &settings),
    ))
}
