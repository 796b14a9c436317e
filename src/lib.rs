//! Threaded comments and suggested edits anchored to plain-text documents.
//!
//! Comments live either inline, as `{>>[@...] text <<}` markers, or in a
//! JSON sidecar keyed by the content hash. Suggestions are applied through
//! `Document`, which keeps every other anchor in place as content changes.

pub mod config;
pub mod conflict_detector;
pub mod document;
pub mod error;
pub mod hunk;
pub mod ids;
pub mod marker_codec;
pub mod models;
pub mod outline;
pub mod position_tracker;
pub mod sidecar;
pub mod suggestion_applier;
pub mod text;
pub mod threads;
pub mod validation;

pub use config::EngineConfig;
pub use conflict_detector::{has_conflicts, sort_for_application, ConflictDetector};
pub use document::{Document, PendingApplication};
pub use error::{ApplyError, ConfigError, DocumentError, DocumentParseError, MetadataError, SidecarError};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use models::{
    AcceptanceState, Comment, CommentStatus, CommentType, Conflict, ConflictKind, Priority,
    Selection, SelectionKind, Suggestion,
};
pub use outline::{MarkdownOutline, Outline, Section};
pub use suggestion_applier::{apply_comment, apply_multiple, apply_suggestion, AppliedEdit, BatchOutcome};
pub use validation::{compute_document_hash, ValidationIssue, ValidationReport};

/// Install `env_logger` as the `log` backend, honouring `RUST_LOG`.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}
