//! Structured error types for the label renderer.
//!
//! One enum covers every failure a render pass can report. Each variant
//! carries enough context (field name, row index, geometry values) for the
//! calling layer to build a user-facing message.

use std::path::PathBuf;

use thiserror::Error;

/// The unified error type returned by all public boxlabel API functions.
#[derive(Debug, Error)]
pub enum LabelError {
    /// A source row is missing a required field, or a field has the wrong type.
    #[error("row {row}: field '{field}' {reason}")]
    Validation {
        field: String,
        /// Zero-based position of the row in the input sequence.
        row: usize,
        reason: String,
    },

    /// Configuration values are out of range or inconsistent with the page.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A nested record declares more inner boxes than fit its outer box.
    #[error(
        "record '{record}' (row {row}) declares {declared} inner boxes but only {capacity} fit"
    )]
    LayoutOverflow {
        record: String,
        row: usize,
        declared: usize,
        capacity: usize,
    },

    /// PDF construction or output failed.
    #[error("render error: {0}")]
    Render(String),

    /// The caller aborted the pass between two pages.
    #[error("render cancelled after {done} of {total} pages")]
    Cancelled { done: usize, total: usize },

    /// Another render against the same output path is still running.
    #[error("output {} is already being rendered", .0.display())]
    OutputBusy(PathBuf),

    /// The spreadsheet collaborator could not produce rows.
    #[error("failed to read {}: {reason}", path.display())]
    Source { path: PathBuf, reason: String },

    /// A JSON configuration file failed to parse.
    #[error("failed to parse configuration: {source}{}", hint_suffix(.hint))]
    ConfigParse {
        #[source]
        source: serde_json::Error,
        hint: String,
    },
}

fn hint_suffix(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

impl LabelError {
    pub(crate) fn validation(field: &str, row: usize, reason: impl Into<String>) -> Self {
        LabelError::Validation {
            field: field.to_string(),
            row,
            reason: reason.into(),
        }
    }

    /// Whether a per-record policy may skip this error and keep rendering.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            LabelError::Validation { .. } | LabelError::LayoutOverflow { .. }
        )
    }
}

impl From<serde_json::Error> for LabelError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the label configuration schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        LabelError::ConfigParse { source: e, hint }
    }
}
