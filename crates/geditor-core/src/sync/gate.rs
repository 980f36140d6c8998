//! Confirmation gate
//!
//! Asked only when the user wants to start a new document while the open
//! one has unsaved changes.

use std::str::FromStr;

use thiserror::Error;

use crate::models::DocumentContent;

/// Decision when leaving a dirty document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeaveChoice {
    /// Send the draft to the server, then start over
    SaveAndLeave,
    /// Drop the draft and start over
    #[default]
    Discard,
    /// Stay on the current document
    Cancel,
}

/// What happened to a "new document" request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Draft, snapshot and navigation context were cleared
    Left,
    /// Waiting for a `LeaveChoice`
    ConfirmationRequired,
    /// Nothing changed
    Cancelled,
}

/// Input that is not a leave choice
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown choice '{0}': expected save, no or cancel")]
pub struct UnknownChoice(String);

impl FromStr for LeaveChoice {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "save" | "y" | "yes" => Ok(LeaveChoice::SaveAndLeave),
            // Empty input takes the default
            "" | "n" | "no" | "discard" => Ok(LeaveChoice::Discard),
            "c" | "cancel" => Ok(LeaveChoice::Cancel),
            other => Err(UnknownChoice(other.to_string())),
        }
    }
}

/// Something that can ask the user what to do with unsaved changes
pub trait ConfirmationGate {
    fn confirm_leave(&mut self, draft: &DocumentContent) -> LeaveChoice;
}

impl<F> ConfirmationGate for F
where
    F: FnMut(&DocumentContent) -> LeaveChoice,
{
    fn confirm_leave(&mut self, draft: &DocumentContent) -> LeaveChoice {
        self(draft)
    }
}
