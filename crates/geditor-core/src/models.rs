//! Data models for geditor
//!
//! Defines the document shapes exchanged with the server and the
//! title/body pair used for drafts and snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors when parsing a document ID
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentIdError {
    #[error("Document ID is empty")]
    Empty,
}

/// Server-assigned document identifier
///
/// Always non-empty. Drafts that were never saved have no ID at all
/// rather than an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse an ID, rejecting empty or whitespace-only input
    pub fn parse(s: &str) -> Result<Self, DocumentIdError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DocumentIdError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as known by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Server-assigned identifier, absent until the first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    /// Author, set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub title: String,
    pub text: String,
}

impl Document {
    /// Create an unsaved document
    pub fn draft(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            author_id: None,
            title: title.into(),
            text: text.into(),
        }
    }

    /// Whether the server has assigned this document an ID
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// The title/body pair of this document
    pub fn content(&self) -> DocumentContent {
        DocumentContent::new(self.title.clone(), self.text.clone())
    }
}

/// Title and body of a document
///
/// Used both for the locally edited draft and for the last
/// server-confirmed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub title: String,
    pub text: String,
}

impl DocumentContent {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}
