//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use geditor_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "server_url": config.server_url,
                    "token_url": config.token_url,
                    "app_url": config.app_url,
                    "initial_reconnect_delay_ms": config.initial_reconnect_delay_ms,
                    "max_reconnect_delay_ms": config.max_reconnect_delay_ms,
                    "request_timeout_secs": config.request_timeout_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:                   {}", config.data_dir.display());
            println!("  server_url:                 {}", config.server_url);
            println!(
                "  token_url:                  {}",
                config.token_url.as_deref().unwrap_or("(not set)")
            );
            println!("  app_url:                    {}", config.app_url);
            println!(
                "  initial_reconnect_delay_ms: {}",
                config.initial_reconnect_delay_ms
            );
            println!("  max_reconnect_delay_ms:     {}", config.max_reconnect_delay_ms);
            println!("  request_timeout_secs:       {}", config.request_timeout_secs);
            println!(
                "  log_file:                   {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "server_url" => {
            if !(value.starts_with("ws://") || value.starts_with("wss://")) {
                bail!("server_url must be a ws:// or wss:// URL");
            }
            config.server_url = value.to_string();
        }
        "token_url" => {
            config.token_url = optional(value).map(String::from);
        }
        "app_url" => {
            config.app_url = value.to_string();
        }
        "initial_reconnect_delay_ms" => {
            config.initial_reconnect_delay_ms = value
                .parse()
                .context("Invalid value for initial_reconnect_delay_ms. Use milliseconds.")?;
        }
        "max_reconnect_delay_ms" => {
            config.max_reconnect_delay_ms = value
                .parse()
                .context("Invalid value for max_reconnect_delay_ms. Use milliseconds.")?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use seconds.")?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, server_url, token_url, app_url, \
                 initial_reconnect_delay_ms, max_reconnect_delay_ms, \
                 request_timeout_secs, log_file",
                key
            );
        }
    }
    Ok(())
}

/// Empty or "none" clears an optional value
fn optional(value: &str) -> Option<&str> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value)
    }
}
