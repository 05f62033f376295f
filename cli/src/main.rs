/// goalrt CLI - run agents, serve them over the debug bridge, or control them
use clap::{Parser, Subcommand};
use goalrt_core::{ConfigManager, GoalrtConfig};
use std::path::{Path, PathBuf};

mod commands;

use commands::{batch, check, control, serve};

/// Load configuration from the given path or the default locations
fn load_config(config_path: Option<&Path>) -> anyhow::Result<GoalrtConfig> {
    let manager = ConfigManager::load(config_path)?;
    Ok(manager.config().clone())
}

#[derive(Parser)]
#[command(name = "goalrt")]
#[command(about = "Execution control for BDI agents", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to $GOALRT_CONFIG, then .goalrt/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an agent file and list its agents
    Check {
        /// Agent file (TOML)
        file: PathBuf,
    },

    /// Run the agents of a file to completion and print a summary
    Batch {
        /// Agent file (TOML)
        file: PathBuf,

        /// Override runtime.max_cycles
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Host the agents of a file and speak the debug protocol on stdin/stdout
    Serve {
        /// Agent file (TOML)
        file: PathBuf,

        /// Pause every agent before its first checkpoint
        #[arg(long)]
        paused: bool,
    },

    /// Start `serve` as a child process and drive it with a script
    Control {
        /// Agent file (TOML)
        file: PathBuf,

        /// Script of controller commands, one per line (stdin if omitted)
        #[arg(short, long)]
        script: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    // Logs go to stderr: stdout carries the wire protocol when serving
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    match args.command {
        Commands::Check { file } => {
            check::execute(&file)?;
        }

        Commands::Batch {
            file,
            max_cycles,
            format,
        } => {
            batch::execute(&config, &file, max_cycles, &format).await?;
        }

        Commands::Serve { file, paused } => {
            serve::execute(&config, &file, paused).await?;
        }

        Commands::Control { file, script } => {
            control::execute(&config, args.config.as_deref(), &file, script.as_deref()).await?;
        }
    }

    Ok(())
}
