use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use streamchat::commands;
use streamchat::config::Config;
use streamchat::generation::{GenerationConfig, Model};
use streamchat::session::Startup;
use streamchat::ui;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(version)]
#[command(about = "Chat with OpenAI-compatible models in the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of ~/.streamchat/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model identifier for this run
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature, 0.0 to 2.0
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens in the reply, 100 to 8192
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Send a single prompt, print the reply and exit
    #[arg(short, long)]
    prompt: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported model identifiers
    Models,
    /// Write a default config file if none exists
    Init,
}

impl Cli {
    /// Apply command-line overrides on top of the config file values.
    /// Out-of-range values are rejected here rather than clamped.
    fn generation(&self, config: &Config) -> Result<GenerationConfig> {
        let defaults = config.generation.to_generation_config();
        let model = match &self.model {
            Some(id) => Model::parse(id)?,
            None => defaults.model(),
        };
        Ok(GenerationConfig::new(
            model,
            self.temperature.unwrap_or(defaults.temperature()),
            self.max_tokens.unwrap_or(defaults.max_tokens()),
        )?)
    }
}

fn init_tracing(to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if to_file {
        let dir = Config::home_dir()?;
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let log_path = dir.join("streamchat.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if path.exists() {
        println!("📄 Config already exists at {}", path.display());
        return Ok(());
    }

    Config::default().save(&path)?;
    println!("✨ Wrote default config to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = cli.command.is_none() && cli.prompt.is_none();
    init_tracing(interactive)?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Models) => {
            commands::list_models(config.generation.to_generation_config().model()).await
        }
        Some(Commands::Init) => init_config(cli.config),
        None => {
            let generation = cli.generation(&config)?;
            let startup = Startup::from_config(&config, generation, |name| std::env::var(name).ok());

            match &cli.prompt {
                Some(prompt) => commands::run_prompt(startup, prompt).await,
                None => ui::run_tui(startup, &config.ui).await,
            }
        }
    }
}
