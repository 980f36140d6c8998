//! Sync error handling
//!
//! Every failure the sync controller can surface to the user. None of these
//! are fatal: the last known-good draft, snapshot and document list are kept.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors surfaced by the sync controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Token provider failed or the token exchange was refused
    #[error("Failed to load session token: {0}")]
    TokenFetch(String),

    /// Server refused the authenticated connection
    #[error("Server rejected the connection: {0}")]
    ConnectRejected(String),

    /// Draft failed local validation; nothing was sent
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Server could not open the requested document
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String, message: String },

    /// Server refused a save
    #[error("Save rejected: {0}")]
    SaveRejected(String),

    /// Server refused an update
    #[error("Update rejected: {0}")]
    UpdateRejected(String),

    /// Server failed to produce the document list
    #[error("Failed to load documents: {0}")]
    ListRejected(String),

    /// Operation needs a live connection
    #[error("Not connected to the server")]
    NotConnected,

    /// Empty or malformed document ID
    #[error("Invalid document ID: {0:?}")]
    InvalidDocumentId(String),

    /// Update needs a persisted document
    #[error("No document is open")]
    NoOpenDocument,

    /// `resolve_leave` without a pending confirmation
    #[error("No leave confirmation is pending")]
    NoPendingConfirmation,

    /// Outbound frame could not be handed to the transport
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SyncError {
    /// Whether the user can fix this without restarting the session
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SyncError::TokenFetch(_) | SyncError::ConnectRejected(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::TokenFetch(_) => {
                Some("Check your session credential (--token or GEDITOR_SESSION_TOKEN) and the token_url setting.")
            }
            SyncError::ConnectRejected(_) => {
                Some("The server did not accept the access token. Sign in again to get a fresh credential.")
            }
            SyncError::Validation(_) => {
                Some("Titles need 2-20 characters and texts 2-1000 characters.")
            }
            SyncError::NotConnected => {
                Some("Wait for the connection to the server to come back and try again.")
            }
            _ => None,
        }
    }
}

impl From<ValidationErrors> for SyncError {
    fn from(errors: ValidationErrors) -> Self {
        SyncError::Validation(errors)
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
