//! Document validation
//!
//! Checks a title and body before they are sent to the server.
//! Both rules are always checked so every violation can be shown at once.

use std::fmt;

use crate::models::DocumentContent;

/// Minimum title length, in characters, after trimming
pub const TITLE_MIN_CHARS: usize = 2;
/// Maximum title length, in characters, after trimming
pub const TITLE_MAX_CHARS: usize = 20;
/// Minimum body length, in characters, after trimming
pub const TEXT_MIN_CHARS: usize = 2;
/// Maximum body length, in characters, after trimming
pub const TEXT_MAX_CHARS: usize = 1000;

/// A single rule violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    TitleTooShort,
    TitleTooLong,
    TextTooShort,
    TextTooLong,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::TitleTooShort => {
                write!(f, "Título no mínimo {} caracteres", TITLE_MIN_CHARS)
            }
            Violation::TitleTooLong => {
                write!(f, "Título no máximo {} caracteres", TITLE_MAX_CHARS)
            }
            Violation::TextTooShort => {
                write!(f, "Texto no mínimo {} caracteres", TEXT_MIN_CHARS)
            }
            Violation::TextTooLong => {
                write!(f, "Texto no máximo {} caracteres", TEXT_MAX_CHARS)
            }
        }
    }
}

/// Ordered list of violations (title rule first)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Human-readable messages, in rule order
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a title and body
///
/// Returns the trimmed content when both rules pass.
pub fn validate(title: &str, text: &str) -> Result<DocumentContent, ValidationErrors> {
    let title = title.trim();
    let text = text.trim();
    let mut violations = Vec::new();

    if let Some(v) = check_length(
        title,
        TITLE_MIN_CHARS,
        TITLE_MAX_CHARS,
        Violation::TitleTooShort,
        Violation::TitleTooLong,
    ) {
        violations.push(v);
    }

    if let Some(v) = check_length(
        text,
        TEXT_MIN_CHARS,
        TEXT_MAX_CHARS,
        Violation::TextTooShort,
        Violation::TextTooLong,
    ) {
        violations.push(v);
    }

    if violations.is_empty() {
        Ok(DocumentContent::new(title, text))
    } else {
        Err(ValidationErrors { violations })
    }
}

/// Validate a draft
pub fn validate_content(content: &DocumentContent) -> Result<DocumentContent, ValidationErrors> {
    validate(&content.title, &content.text)
}

fn check_length(
    value: &str,
    min: usize,
    max: usize,
    too_short: Violation,
    too_long: Violation,
) -> Option<Violation> {
    let len = value.chars().count();
    if len < min {
        Some(too_short)
    } else if len > max {
        Some(too_long)
    } else {
        None
    }
}
