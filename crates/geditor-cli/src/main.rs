//! Geditor CLI
//!
//! Command-line client for the collaborative document editor.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use geditor_core::Config;

mod commands;
mod output;
mod token;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "geditor")]
#[command(about = "Geditor - realtime collaborative document editing")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session credential (falls back to GEDITOR_SESSION_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive editing session
    Edit {
        /// Document to open (defaults to the last open one)
        #[arg(short, long)]
        doc: Option<String>,
    },
    /// List documents on the server
    #[command(alias = "ls")]
    List,
    /// Show one document
    Show {
        /// Document ID
        id: String,
    },
    /// Show status (endpoints, last open document)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, token_url, app_url, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands must work even with a broken config file
    if let Some(Commands::Config { command }) = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let credential = token::resolve_credential(cli.token);

    match cli.command {
        Some(Commands::Edit { doc }) => commands::edit::run(&config, doc, credential, &output).await,
        None => commands::edit::run(&config, None, credential, &output).await,
        Some(Commands::List) => commands::documents::list(&config, credential, &output).await,
        Some(Commands::Show { id }) => {
            commands::documents::show(&config, id, credential, &output).await
        }
        Some(Commands::Status) => commands::status::show(&config, credential, &output),
        Some(Commands::Config { .. }) => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only initializes if GEDITOR_LOG environment variable is set.
/// Logs to file (config.log_file or default {data_dir}/geditor.log) so the
/// interactive session stays readable.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("GEDITOR_LOG") else {
        return;
    };

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "geditor_core={},geditor_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
