//! Navigation context
//!
//! Keeps the open document's ID in an addressable location (the `doc`
//! query parameter) so a reload can reopen the same document.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::models::DocumentId;

/// Query parameter holding the open document ID
pub const DOC_PARAM: &str = "doc";

/// Errors from navigation context storage
#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("Invalid location '{location}': {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to persist location to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the open document's ID survives a reload
pub trait NavigationContext {
    /// Document ID named by the current location, if any
    fn current(&self) -> Option<DocumentId>;

    /// Point the location at a document, or clear it
    fn set_current(&mut self, id: Option<&DocumentId>) -> Result<(), NavigationError>;
}

/// An addressable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Url,
}

impl Location {
    pub fn parse(location: &str) -> Result<Self, NavigationError> {
        let url = Url::parse(location).map_err(|source| NavigationError::InvalidLocation {
            location: location.to_string(),
            source,
        })?;
        Ok(Self { url })
    }

    /// Document ID from the `doc` query parameter
    pub fn document_id(&self) -> Option<DocumentId> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == DOC_PARAM)
            .and_then(|(_, value)| DocumentId::parse(&value).ok())
    }

    /// Set or remove the `doc` parameter, keeping every other parameter
    pub fn set_document_id(&mut self, id: Option<&DocumentId>) {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(key, _)| key != DOC_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() && id.is_none() {
            self.url.set_query(None);
            return;
        }

        let mut pairs = self.url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        if let Some(id) = id {
            pairs.append_pair(DOC_PARAM, id.as_str());
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// In-memory navigation context
#[derive(Debug, Clone)]
pub struct MemoryNavigation {
    location: Location,
}

impl MemoryNavigation {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl NavigationContext for MemoryNavigation {
    fn current(&self) -> Option<DocumentId> {
        self.location.document_id()
    }

    fn set_current(&mut self, id: Option<&DocumentId>) -> Result<(), NavigationError> {
        self.location.set_document_id(id);
        Ok(())
    }
}

/// Navigation context persisted to a file
///
/// The file holds the full location string. A missing or unreadable file
/// falls back to the base location.
#[derive(Debug, Clone)]
pub struct FileNavigation {
    path: PathBuf,
    location: Location,
}

impl FileNavigation {
    /// Restore the location stored at `path`, or start from `base`
    pub fn open(path: impl Into<PathBuf>, base: &str) -> Result<Self, NavigationError> {
        let path = path.into();
        let location = match fs::read_to_string(&path) {
            Ok(stored) => match Location::parse(stored.trim()) {
                Ok(location) => location,
                Err(e) => {
                    warn!("Ignoring stored location: {}", e);
                    Location::parse(base)?
                }
            },
            Err(_) => Location::parse(base)?,
        };
        debug!("Navigation context at {}", location.as_str());
        Ok(Self { path, location })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    fn persist(&self) -> Result<(), NavigationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| NavigationError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, self.location.as_str()).map_err(|source| NavigationError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl NavigationContext for FileNavigation {
    fn current(&self) -> Option<DocumentId> {
        self.location.document_id()
    }

    fn set_current(&mut self, id: Option<&DocumentId>) -> Result<(), NavigationError> {
        self.location.set_document_id(id);
        self.persist()
    }
}
