mod config;
mod demo;

pub use config::ConfigCommand;
pub use demo::DemoCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use runq::runq_core::config::{LogFormat, ObservabilityConfig, RunqConfig};

/// runq - an in-process background job queue
#[derive(Parser)]
#[command(name = "runq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue a batch of demo jobs, run workers and print the results.
    Demo(DemoCommand),

    /// Print the effective configuration.
    Config(ConfigCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Demo(cmd) => cmd.execute().await,
            Commands::Config(cmd) => cmd.execute(),
        }
    }
}

/// Load the config file if one was given, otherwise use defaults.
pub(crate) fn load_config(path: Option<&str>) -> Result<RunqConfig> {
    match path {
        Some(path) => {
            if !std::path::Path::new(path).exists() {
                anyhow::bail!("Configuration file not found: {}", path);
            }
            Ok(RunqConfig::from_file(path)?)
        }
        None => Ok(RunqConfig::default()),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the config.
pub(crate) fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match config.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
