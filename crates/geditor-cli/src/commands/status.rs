//! Status command handler

use anyhow::Result;

use geditor_core::{Config, FileNavigation, NavigationContext};

use crate::output::{Output, OutputFormat};
use crate::token::{resolve_credential, CREDENTIAL_ENV};

/// Show status information
pub fn show(config: &Config, credential: Option<String>, output: &Output) -> Result<()> {
    let navigation = FileNavigation::open(config.location_path(), &config.app_url)?;
    let last_document = navigation.current();
    let has_credential = resolve_credential(credential).is_some();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "token_url": config.token_url,
                    "location": navigation.location().as_str(),
                    "last_document": last_document,
                    "credential": has_credential,
                    "data_dir": config.data_dir
                })
            );
        }
        OutputFormat::Quiet => {
            if let Some(id) = last_document {
                println!("{}", id);
            }
        }
        OutputFormat::Human => {
            println!("Geditor Status");
            println!("==============");
            println!();
            println!("Server:");
            println!("  WebSocket: {}", config.server_url);
            println!(
                "  Token:     {}",
                config
                    .token_url
                    .as_deref()
                    .unwrap_or("(credential used directly)")
            );
            if has_credential {
                println!("  Credential: set");
            } else {
                println!("  Credential: missing (use --token or set {})", CREDENTIAL_ENV);
            }
            println!();
            println!("Navigation:");
            println!("  Location:      {}", navigation.location().as_str());
            println!(
                "  Last document: {}",
                last_document
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
            println!();
            println!("Data directory: {}", config.data_dir.display());
        }
    }

    Ok(())
}
