//! Ava CLI - hosts the local model supervisor.
//!
//! `ava serve` is what the desktop app launches: it speaks newline-delimited
//! JSON on stdin/stdout and keeps logs on stderr.

use ava_local_ai::{SupervisorConfig, SupervisorConfigBuilder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod commands;

/// Ava - run local language models side by side
#[derive(Parser)]
#[command(name = "ava")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model registry file
    #[arg(long, global = true, env = "AVA_MODEL_CONFIG")]
    config: Option<PathBuf>,

    /// llamafile executable
    #[arg(long, global = true, env = "AVA_LLAMAFILE")]
    llamafile: Option<PathBuf>,

    /// First port handed to a model server
    #[arg(long, global = true, env = "AVA_BASE_PORT")]
    base_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the supervisor over stdin/stdout
    Serve,

    /// List models in the registry
    Models {
        /// Output the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show paths and runtime configuration
    Info,

    /// Start a model and send it one prompt
    Chat {
        /// Model id from the registry
        model: String,
        /// Prompt text
        prompt: String,
        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Seconds to wait for the model server to become ready
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}

impl Cli {
    fn supervisor_config(&self) -> SupervisorConfig {
        let mut builder = SupervisorConfigBuilder::from_config(SupervisorConfig::from_env());
        if let Some(path) = &self.config {
            builder = builder.registry_path(path);
        }
        if let Some(path) = &self.llamafile {
            builder = builder.runtime_binary(path);
        }
        if let Some(port) = self.base_port {
            builder = builder.base_port(port);
        }
        builder.build()
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout belongs to the protocol
    let filter = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = cli.supervisor_config();
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Serve => runtime.block_on(commands::serve::run(config)),
        Commands::Models { json } => runtime.block_on(commands::models::run(&config, json)),
        Commands::Info => commands::info::run(&config),
        Commands::Chat {
            model,
            prompt,
            system,
            temperature,
            max_tokens,
            timeout,
        } => runtime.block_on(commands::chat::run(
            config,
            commands::chat::ChatArgs {
                model,
                prompt,
                system,
                temperature,
                max_tokens,
                timeout: Duration::from_secs(timeout),
            },
        )),
    }
}
