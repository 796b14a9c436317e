// src/error.rs
//! Error types for the annotation engine.
//!
//! Every failure is a value returned to the caller; nothing here is fatal.
//! An orphaned anchor is not an error at all, it is recorded as
//! `CommentStatus::Orphaned` by validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::AcceptanceState;

/// A marker payload that no known metadata format accepts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("line {line}: invalid timestamp '{value}'")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: unknown metadata format ({colons} colons)")]
    UnknownMetadataFormat { line: usize, colons: usize },
}

impl MetadataError {
    /// 1-indexed physical line the marker was found on
    pub fn line(&self) -> usize {
        match self {
            MetadataError::InvalidTimestamp { line, .. } => *line,
            MetadataError::UnknownMetadataFormat { line, .. } => *line,
        }
    }
}

/// Whole-document parse failure. Parsing is atomic, so this lists every
/// offending marker rather than returning a partial document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} malformed comment marker(s), first at line {}", .errors.len(), first_line(.errors))]
pub struct DocumentParseError {
    pub errors: Vec<MetadataError>,
}

fn first_line(errors: &[MetadataError]) -> usize {
    errors.first().map(MetadataError::line).unwrap_or(0)
}

/// Failure to apply a suggestion to document content
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("original text mismatch: expected {expected:?}, found {actual:?}")]
    OriginalTextMismatch { expected: String, actual: String },

    #[error("lines {start}-{end} out of range (document has {line_count} lines)")]
    LineOutOfRange {
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("bytes {offset}+{length} out of range (document has {content_len} bytes)")]
    OffsetOutOfRange {
        offset: usize,
        length: usize,
        content_len: usize,
    },

    #[error("invalid diff hunk header: {0:?}")]
    InvalidDiffHeader(String),

    #[error("invalid diff hunk line: {0:?}")]
    InvalidDiffLine(String),

    #[error("unknown selection kind: {0:?}")]
    UnknownSelectionKind(String),

    #[error("selection is missing {0}")]
    IncompleteSelection(&'static str),

    #[error("comment {0} does not carry a suggestion")]
    NotASuggestion(String),

    #[error("suggestion {id} is already {state:?}")]
    NotPending { id: String, state: AcceptanceState },
}

/// Errors from document-level orchestration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("comment not found: {0}")]
    CommentNotFound(String),

    #[error("failed to apply suggestion {id}: {source}")]
    Apply {
        id: String,
        #[source]
        source: ApplyError,
    },

    #[error(transparent)]
    Parse(#[from] DocumentParseError),
}

/// Errors reading or writing a sidecar envelope
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sidecar version {found} is not supported (reader supports {supported})")]
    UnsupportedVersion { found: String, supported: String },
}

/// Errors loading engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_reports_first_line() {
        let err = DocumentParseError {
            errors: vec![
                MetadataError::UnknownMetadataFormat { line: 4, colons: 2 },
                MetadataError::InvalidTimestamp {
                    line: 9,
                    value: "yesterday".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 malformed comment marker(s), first at line 4"
        );
    }

    #[test]
    fn test_apply_error_messages() {
        let err = ApplyError::LineOutOfRange {
            start: 5,
            end: 7,
            line_count: 3,
        };
        assert_eq!(err.to_string(), "lines 5-7 out of range (document has 3 lines)");
    }
}
