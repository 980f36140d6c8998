//! Document command handlers

use anyhow::{Context, Result};

use geditor_core::{Config, DocumentId, Location, MemoryNavigation, NavigationContext, SyncEvent};

use super::{start_session, wait_for};
use crate::output::Output;

/// List documents on the server
pub async fn list(config: &Config, credential: Option<String>, output: &Output) -> Result<()> {
    let navigation = MemoryNavigation::new(Location::parse(&config.app_url)?);
    let mut session = start_session(config, credential, navigation)?;

    let documents = wait_for(&mut session, config.request_timeout(), |event| match event {
        SyncEvent::ListChanged(documents) => Some(documents),
        _ => None,
    })
    .await;
    session.shutdown().await;

    output.print_documents(&documents?);
    Ok(())
}

/// Show one document
pub async fn show(
    config: &Config,
    id: String,
    credential: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = DocumentId::parse(&id).with_context(|| format!("Invalid document ID: {:?}", id))?;

    // Opened by navigation restore once the connection is up
    let mut navigation = MemoryNavigation::new(Location::parse(&config.app_url)?);
    navigation.set_current(Some(&id))?;
    let mut session = start_session(config, credential, navigation)?;

    let document = wait_for(&mut session, config.request_timeout(), |event| match event {
        SyncEvent::DocumentOpened(document) => Some(document),
        _ => None,
    })
    .await;
    session.shutdown().await;

    output.print_document(&document?);
    Ok(())
}
