//! Command handlers

pub mod config;
pub mod documents;
pub mod edit;
pub mod status;

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::time::timeout;

use geditor_core::{
    spawn_session, Config, NavigationContext, SessionHandle, SyncController, SyncError, SyncEvent,
    WsTransport,
};

use crate::token::CliTokenProvider;

/// Start a session against the configured server
pub fn start_session<N>(
    config: &Config,
    credential: Option<String>,
    navigation: N,
) -> Result<SessionHandle>
where
    N: NavigationContext + Send + 'static,
{
    let provider = CliTokenProvider::from_config(config, credential)?;
    let transport = WsTransport::new(config.transport_config());
    let controller = SyncController::new(transport, navigation);
    Ok(spawn_session(controller, provider))
}

/// Wait for the first event `select` accepts
///
/// Any error event ends the wait.
pub async fn wait_for<T, F>(session: &mut SessionHandle, wait: Duration, mut select: F) -> Result<T>
where
    F: FnMut(SyncEvent) -> Option<T>,
{
    let next = async {
        while let Some(event) = session.event_rx.recv().await {
            if let SyncEvent::Error(e) = event {
                return Err(describe(e));
            }
            if let Some(found) = select(event) {
                return Ok(found);
            }
        }
        Err(anyhow!("Session ended unexpectedly"))
    };

    match timeout(wait, next).await {
        Ok(result) => result,
        Err(_) => bail!(
            "Timed out after {}s waiting for the server",
            wait.as_secs()
        ),
    }
}

/// Attach the recovery hint to a sync error
pub fn describe(error: SyncError) -> anyhow::Error {
    match error.recovery_suggestion() {
        Some(hint) => anyhow!("{}\n  {}", error, hint),
        None => anyhow!(error),
    }
}
