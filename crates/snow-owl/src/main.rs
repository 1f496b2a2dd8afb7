mod commands;
mod config;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snow-owl")]
#[command(about = "Operator tool for the Snow-Owl connection defender", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/snow-owl/config.toml")]
    config: PathBuf,

    /// Override the configured log format
    #[arg(long)]
    log_format: Option<config::LogFormat>,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and the safe/block list files
    Validate,

    /// Show banned and safe status for addresses
    Check {
        /// IP addresses to check
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Feed a JSON-lines event log into a fresh defender and print its tables
    Replay {
        /// Event log file, `-` reads standard input
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = cli.command {
        return commands::init::init_config(&cli.config, force).await;
    }

    let mut app_config = config::load_config(&cli.config).await?;
    if let Some(format) = cli.log_format {
        app_config.logging.format = format;
    }
    if cli.verbose {
        app_config.logging.level = "debug".to_string();
    }

    let _log_guard = logging::init(&app_config.logging);

    tracing::debug!(
        event = "config_loaded",
        path = %cli.config.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::InitConfig { .. } => Ok(()),
        Commands::Validate => commands::check::validate(&app_config),
        Commands::Check { addresses } => commands::check::check(&app_config, &addresses),
        Commands::Replay { file } => commands::replay::run(&app_config, &file).await,
    }
}
