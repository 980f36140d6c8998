//! Geditor Core Library
//!
//! Client side of a realtime collaborative document editor: one open
//! document with a local draft, kept in sync with an editing server over a
//! persistent WebSocket.
//!
//! # Architecture
//!
//! - **Server**: source of truth for documents; the client keeps only the
//!   last loaded snapshot and the list it was last sent
//! - **Controller**: a synchronous state machine, driven by transport events
//!   and user operations
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let navigation = FileNavigation::open(config.location_path(), &config.app_url)?;
//! let controller = SyncController::new(WsTransport::new(config.transport_config()), navigation);
//!
//! let mut session = spawn_session(controller, StaticTokenProvider::new(Some(token)));
//! session.send(SessionCommand::Open("abc123".into())).await;
//! ```
//!
//! # Modules
//!
//! - `sync`: Transport, controller, confirmation gate and session driver
//! - `models`: Documents and drafts
//! - `validation`: Title and text rules
//! - `dirty`: Unsaved-change detection
//! - `navigation`: Addressable location of the open document
//! - `token`: Access token providers
//! - `config`: Application configuration

pub mod config;
pub mod dirty;
pub mod error;
pub mod models;
pub mod navigation;
pub mod sync;
pub mod token;
pub mod validation;

pub use config::Config;
pub use dirty::is_dirty;
pub use error::{SyncError, SyncResult};
pub use models::{Document, DocumentContent, DocumentId, DocumentIdError};
pub use navigation::{FileNavigation, Location, MemoryNavigation, NavigationContext, NavigationError};
pub use sync::{
    spawn_session, ConfirmationGate, ConnectionState, LeaveChoice, LeaveOutcome, SessionCommand,
    SessionHandle, SessionState, SyncController, SyncEvent, WsTransport,
};
pub use token::{AccessToken, StaticTokenProvider, TokenError, TokenProvider};
pub use validation::{validate, ValidationErrors, Violation};
