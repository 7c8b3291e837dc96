mod chat;
mod cli;
mod color;
mod config;
mod params;
mod persona;
mod providers;
mod relay;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{chat::chat_cmd, levels::levels_cmd, ColorMode};
use tracing_subscriber::EnvFilter;

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "professeur")]
#[command(about = "Practice French with a tutor backed by a hosted chat model", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[arg(long, global = true, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Increase logging verbosity, may be repeated
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Read the configuration from PATH instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the tutor
    Chat(ChatArgs),
    /// List the tutor levels and their system prompts
    Levels(LevelsArgs),
}

#[derive(Parser, Default)]
pub(crate) struct ChatArgs {
    /// CEFR level of the tutor (A1, A2, B1, B2, C1 or C2)
    #[arg(short, long)]
    level: Option<String>,
    /// Use TEXT as the system prompt instead of a level
    #[arg(short, long, value_name = "TEXT", conflicts_with = "level")]
    persona: Option<String>,
    /// Model to chat with
    #[arg(short, long)]
    model: Option<String>,
    /// Base URL of the chat completions endpoint
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,
    /// Upper bound on generated tokens (1 to 2048)
    #[arg(long, value_name = "N")]
    max_tokens: Option<u32>,
    /// Sampling temperature (0.1 to 4.0)
    #[arg(short, long, value_name = "T")]
    temperature: Option<f64>,
    /// Nucleus sampling cutoff (0.1 to 1.0)
    #[arg(long, value_name = "P")]
    top_p: Option<f64>,
    /// Start from the turns in a JSON history file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,
    /// Enter interactive mode
    #[arg(short, long)]
    interactive: bool,
    /// Specify the initial prompt
    prompt: Option<String>,
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser, Default)]
pub(crate) struct LevelsArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// Print system prompts in full rather than truncated
    #[arg(long)]
    full: bool,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color::color_mode() == ColorMode::On)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    color::configure_color(ColorMode::resolve_auto(cli.color));

    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Levels(args)) => levels_cmd(args),
        command => {
            let config = match config::read_config(cli.config.clone()) {
                Ok(config) => config,
                Err(err) => die!("{}", err),
            };

            match command {
                Some(Commands::Chat(args)) => chat_cmd(config, args).await,
                _ => chat_cmd(config, &ChatArgs::default()).await,
            }
        }
    }
}
