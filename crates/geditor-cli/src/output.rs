//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use geditor_core::{ConnectionState, Document, SessionState, SyncError, SyncEvent};
use serde_json::json;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single document
    pub fn print_document(&self, document: &Document) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:     {}", display_id(document));
                println!("Title:  {}", document.title);
                if let Some(ref author) = document.author_id {
                    println!("Author: {}", author);
                }
                println!();
                println!("{}", document.text);
            }
            OutputFormat::Json => {
                println!("{}", to_json(document));
            }
            OutputFormat::Quiet => {
                println!("{}", display_id(document));
            }
        }
    }

    /// Print a list of documents
    pub fn print_documents(&self, documents: &[Document]) {
        match self.format {
            OutputFormat::Human => {
                if documents.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for document in documents {
                    println!(
                        "{} | {} | {}",
                        display_id(document),
                        truncate(&document.title, 20),
                        truncate_line(&document.text, 45)
                    );
                }
                println!("\n{} document(s)", documents.len());
            }
            OutputFormat::Json => {
                println!("{}", to_json(&documents));
            }
            OutputFormat::Quiet => {
                for document in documents {
                    println!("{}", display_id(document));
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a sync error with its recovery hint; shown in every mode
    pub fn error(&self, error: &SyncError) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({
                        "status": "error",
                        "message": error.to_string(),
                        "hint": error.recovery_suggestion()
                    })
                );
            }
            _ => {
                eprintln!("✗ {}", error);
                if let Some(hint) = error.recovery_suggestion() {
                    eprintln!("  {}", hint);
                }
            }
        }
    }

    /// Render a controller event during an interactive session
    pub fn print_event(&self, event: &SyncEvent) {
        if let SyncEvent::Error(e) = event {
            self.error(e);
            return;
        }
        match self.format {
            OutputFormat::Human => print_event_human(event),
            OutputFormat::Json => {
                if let Some(value) = event_json(event) {
                    println!("{}", value);
                }
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_event_human(event: &SyncEvent) {
    match event {
        SyncEvent::StatusChanged(ConnectionState::Connected) => println!("● connected"),
        SyncEvent::StatusChanged(ConnectionState::Connecting) => println!("◌ connecting..."),
        SyncEvent::StatusChanged(ConnectionState::Disconnected) => println!("○ disconnected"),
        SyncEvent::StateChanged(SessionState::LoadFailed) => {
            println!("Could not load a session token; restart once the credential is fixed.")
        }
        SyncEvent::StateChanged(_) => {}
        SyncEvent::ListChanged(documents) => {
            println!("── Documents ({}) ──", documents.len());
            for document in documents {
                println!("  {} | {}", display_id(document), truncate(&document.title, 20));
            }
        }
        SyncEvent::DocumentOpened(document) => {
            println!("Opened \"{}\" ({})", document.title, display_id(document));
        }
        SyncEvent::DocumentSaved(document) => {
            println!("✓ Saved \"{}\" ({})", document.title, display_id(document));
        }
        SyncEvent::DocumentUpdated(_) => println!("✓ Updated"),
        SyncEvent::DraftChanged(draft) => {
            println!("── Text changed in another session ──");
            println!("{}", draft.text);
        }
        SyncEvent::DocumentClosed => println!("New document"),
        SyncEvent::LeaveConfirmationRequired => {
            println!("Unsaved changes. Save before leaving? [s]ave / [N]o / [c]ancel");
        }
        SyncEvent::Error(_) => {}
    }
}

fn event_json(event: &SyncEvent) -> Option<serde_json::Value> {
    let value = match event {
        SyncEvent::StatusChanged(status) => {
            json!({"event": "status", "status": format!("{:?}", status).to_lowercase()})
        }
        SyncEvent::StateChanged(state) => json!({"event": "state", "state": format!("{:?}", state)}),
        SyncEvent::ListChanged(documents) => json!({"event": "list", "documents": documents}),
        SyncEvent::DocumentOpened(document) => json!({"event": "opened", "document": document}),
        SyncEvent::DocumentSaved(document) => json!({"event": "saved", "document": document}),
        SyncEvent::DocumentUpdated(id) => json!({"event": "updated", "id": id}),
        SyncEvent::DraftChanged(draft) => json!({"event": "remote_edit", "text": draft.text}),
        SyncEvent::DocumentClosed => json!({"event": "closed"}),
        SyncEvent::LeaveConfirmationRequired => json!({"event": "confirm_leave"}),
        SyncEvent::Error(_) => return None,
    };
    Some(value)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| json!({"error": e.to_string()}).to_string())
}

fn display_id(document: &Document) -> &str {
    document.id.as_ref().map(|id| id.as_str()).unwrap_or("(unsaved)")
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        // Counts characters, not bytes
        assert_eq!(truncate("Título", 6), "Título");
        assert_eq!(truncate("ãããããããã", 5), "ãã...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
    }

    #[test]
    fn test_event_json() {
        let value = event_json(&SyncEvent::StatusChanged(ConnectionState::Connected)).unwrap();
        assert_eq!(value, json!({"event": "status", "status": "connected"}));
        assert!(event_json(&SyncEvent::Error(SyncError::NotConnected)).is_none());
    }

    #[test]
    fn test_display_id_for_draft() {
        assert_eq!(display_id(&Document::draft("Hi", "ab")), "(unsaved)");
    }
}
