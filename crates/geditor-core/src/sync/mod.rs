//! Realtime sync with the editing server
//!
//! ## Protocol
//!
//! JSON text frames over one WebSocket per session:
//! 1. Connect with `Authorization: Bearer <token>`
//! 2. Request the document list (`document.list`)
//! 3. Open, save and update documents; requests carry an `ack` id
//! 4. Receive list pushes and `editor.change` broadcasts from other sessions
//!
//! ## Usage
//!
//! ```ignore
//! let transport = WsTransport::new(config.transport_config());
//! let controller = SyncController::new(transport, navigation);
//! let handle = spawn_session(controller, provider);
//! handle.send(SessionCommand::List).await;
//! ```

mod controller;
mod gate;
mod message;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{
    ConnectionState, ControllerView, SessionState, SyncController, SyncEvent,
};
pub use gate::{ConfirmationGate, LeaveChoice, LeaveOutcome, UnknownChoice};
pub use message::{
    AckId, ClientEvent, ClientMessage, ListReply, ProtocolError, Reply, SavePayload,
    ServerMessage, UpdatePayload,
};
pub use session::{spawn_session, SessionCommand, SessionHandle};
pub use transport::{
    ConnectOutcome, ConnectionInfo, ListenerId, Listeners, Subscription, Transport,
    TransportConfig, TransportError, TransportEvent, WsTransport,
};
