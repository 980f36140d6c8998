//! Session driver
//!
//! Runs a [`SyncController`] on its own tokio task: fetches the token,
//! hands it to the transport, then feeds transport events and user
//! commands to the controller one at a time.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::controller::{ConnectionState, ControllerView, SyncController, SyncEvent};
use super::gate::LeaveChoice;
use super::transport::Transport;
use crate::error::SyncResult;
use crate::navigation::NavigationContext;
use crate::token::TokenProvider;

/// Commands accepted by a running session
#[derive(Debug)]
pub enum SessionCommand {
    Open(String),
    List,
    Save,
    Update,
    EditTitle(String),
    EditText(String),
    NewDocument,
    ResolveLeave(LeaveChoice),
    /// Reply with the current controller view
    Inspect(oneshot::Sender<ControllerView>),
    Shutdown,
}

/// Handle to a running session
pub struct SessionHandle {
    /// Command sender
    pub command_tx: mpsc::Sender<SessionCommand>,
    /// Event receiver
    pub event_rx: mpsc::UnboundedReceiver<SyncEvent>,
    /// Status receiver
    pub status_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Send a command; returns false if the session has ended
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.command_tx.send(command).await.is_ok()
    }

    /// Current view of the controller
    pub async fn inspect(&self) -> Option<ControllerView> {
        let (tx, rx) = oneshot::channel();
        if !self.send(SessionCommand::Inspect(tx)).await {
            return None;
        }
        rx.await.ok()
    }

    /// Stop the session and wait for it to unmount
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Start a session on the current tokio runtime
pub fn spawn_session<T, N, P>(mut controller: SyncController<T, N>, provider: P) -> SessionHandle
where
    T: Transport + Send + 'static,
    N: NavigationContext + Send + 'static,
    P: TokenProvider + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    let event_rx = controller.take_events();
    let status_rx = controller.subscribe_status();

    let task = tokio::spawn(run_session(controller, provider, command_rx));

    SessionHandle {
        command_tx,
        event_rx,
        status_rx,
        task,
    }
}

async fn run_session<T, N, P>(
    mut controller: SyncController<T, N>,
    provider: P,
    mut commands: mpsc::Receiver<SessionCommand>,
) where
    T: Transport,
    N: NavigationContext,
    P: TokenProvider,
{
    let mut subscription = controller.mount();

    controller.begin_authentication();
    let token = provider.fetch_token().await;
    controller.token_received(token);

    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => controller.handle_event(event),
                    None => {
                        debug!("Transport subscription closed");
                        break;
                    }
                }
            }

            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => {
                        if let Err(e) = apply(&mut controller, command) {
                            controller.report(e);
                        }
                    }
                }
            }
        }
    }

    controller.unmount();
    controller.disconnect();
    info!("Session ended");
}

fn apply<T, N>(controller: &mut SyncController<T, N>, command: SessionCommand) -> SyncResult<()>
where
    T: Transport,
    N: NavigationContext,
{
    match command {
        SessionCommand::Open(id) => controller.open_document(&id),
        SessionCommand::List => controller.request_list(),
        SessionCommand::Save => controller.save(),
        SessionCommand::Update => controller.update(),
        SessionCommand::EditTitle(title) => {
            controller.edit_title(title);
            Ok(())
        }
        SessionCommand::EditText(text) => controller.edit_text(text),
        SessionCommand::NewDocument => {
            controller.new_document();
            Ok(())
        }
        SessionCommand::ResolveLeave(choice) => controller.resolve_leave(choice).map(|_| ()),
        SessionCommand::Inspect(reply) => {
            let _ = reply.send(controller.view());
            Ok(())
        }
        SessionCommand::Shutdown => Ok(()),
    }
}
