// src/document.rs
//! A document snapshot and the comment threads anchored to it.
//!
//! `Document` ties the engine together: suggestions are applied through it
//! so that every other anchor is moved in the same step, and content
//! replaced from outside is re-aligned by diff and validated.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::conflict_detector::{sort_for_application, ConflictDetector};
use crate::error::DocumentError;
use crate::hunk::{relocate, HunkHeader};
use crate::ids::IdGenerator;
use crate::marker_codec::{parse_document, serialize_document};
use crate::models::{now, Comment, Conflict, SelectionKind, Suggestion};
use crate::outline::Outline;
use crate::position_tracker::{line_column_at, recompute_byte_offset, LineMapping};
use crate::suggestion_applier::{apply_comment, AppliedEdit, BatchFailure};
use crate::threads::{find_by_id, find_by_id_mut, for_each_comment_mut, pending_suggestions};
use crate::validation::{compute_document_hash, reconcile, validate, ValidationReport};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub threads: Vec<Comment>,
    /// SHA-256 of `content`, kept current by every mutation
    pub document_hash: String,
    pub last_validated: Option<DateTime<Utc>>,
}

/// What `apply_pending` did
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingApplication {
    /// Applied ids, in application order
    pub applied: Vec<String>,
    /// Pending suggestions left out because they conflict with an earlier one
    pub excluded: Vec<String>,
    pub failure: Option<BatchFailure>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            document_hash: compute_document_hash(&content),
            content,
            threads: Vec::new(),
            last_validated: None,
        }
    }

    /// Rebuild a document from stored threads. When the stored hash no
    /// longer matches, every comment is validated individually and the
    /// report is returned.
    pub fn from_stored(
        content: impl Into<String>,
        mut threads: Vec<Comment>,
        stored_hash: Option<&str>,
        outline: Option<&dyn Outline>,
    ) -> (Self, Option<ValidationReport>) {
        let content = content.into();
        let reconciliation = reconcile(&content, &mut threads, stored_hash, outline);
        let document = Self {
            content,
            threads,
            document_hash: reconciliation.document_hash,
            last_validated: reconciliation.last_validated,
        };
        (document, reconciliation.report)
    }

    /// Parse text carrying inline comment markers
    pub fn from_marked_text(text: &str, ids: &dyn IdGenerator) -> Result<Self, DocumentError> {
        let parsed = parse_document(text, ids)?;
        let mut document = Self::new(parsed.content);
        document.threads = parsed.threads;
        Ok(document)
    }

    /// Content with every comment embedded as an inline marker
    pub fn to_marked_text(&self) -> String {
        serialize_document(&self.content, &self.threads)
    }

    pub fn find(&self, id: &str) -> Option<&Comment> {
        find_by_id(&self.threads, id)
    }

    /// Add a root comment, returning its id. A CharRange suggestion is
    /// anchored at the line its byte offset falls on.
    pub fn add_comment(&mut self, mut comment: Comment) -> String {
        if let Some(offset) = comment
            .suggestion
            .as_ref()
            .filter(|s| s.kind == SelectionKind::CharRange)
            .and_then(|s| s.selection.byte_offset)
        {
            comment.line = line_column_at(&self.content, offset).0;
        }
        let id = comment.id.clone();
        debug!("Adding comment {} at line {}", id, comment.line);
        self.threads.push(comment);
        id
    }

    /// Reply to any comment in the forest, returning the reply id
    pub fn add_reply(
        &mut self,
        parent_id: &str,
        ids: &dyn IdGenerator,
        author: &str,
        text: &str,
    ) -> Result<String, DocumentError> {
        let parent = find_by_id_mut(&mut self.threads, parent_id)
            .ok_or_else(|| DocumentError::CommentNotFound(parent_id.to_string()))?;
        Ok(parent.reply(ids, author, text).id.clone())
    }

    /// Propose `new_content` as one DiffHunk suggestion from the configured
    /// author, with `hunk_context` lines of context. None when nothing changed.
    pub fn suggest_rewrite(
        &mut self,
        new_content: &str,
        ids: &dyn IdGenerator,
        config: &EngineConfig,
    ) -> Option<String> {
        let suggestion = Suggestion::from_rewrite(&self.content, new_content, config.hunk_context)?;
        Some(self.add_comment(Comment::new_suggestion(ids, &config.author, "", suggestion)))
    }

    /// Conflicts among the pending suggestions
    pub fn conflicts(&self, config: &EngineConfig) -> Vec<Conflict> {
        ConflictDetector::from_config(config).detect_conflicts(&pending_suggestions(&self.threads))
    }

    /// Apply a pending suggestion, mark it accepted and move every other
    /// anchor across the edit
    pub fn accept_suggestion(&mut self, id: &str) -> Result<AppliedEdit, DocumentError> {
        let comment = self
            .find(id)
            .ok_or_else(|| DocumentError::CommentNotFound(id.to_string()))?;
        let edit = apply_comment(&self.content, comment).map_err(|source| DocumentError::Apply {
            id: id.to_string(),
            source,
        })?;

        if let Some(comment) = find_by_id_mut(&mut self.threads, id) {
            comment.accept().map_err(|source| DocumentError::Apply {
                id: id.to_string(),
                source,
            })?;
        }

        let old_content = std::mem::replace(&mut self.content, edit.content.clone());
        let new_content = &self.content;
        for_each_comment_mut(&mut self.threads, &mut |c| {
            if c.id != id {
                shift_across_edit(c, &edit, &old_content, new_content);
            }
        });
        self.document_hash = compute_document_hash(&self.content);

        info!("Accepted suggestion {}", id);
        Ok(edit)
    }

    pub fn reject_suggestion(&mut self, id: &str) -> Result<(), DocumentError> {
        let comment = find_by_id_mut(&mut self.threads, id)
            .ok_or_else(|| DocumentError::CommentNotFound(id.to_string()))?;
        comment.reject().map_err(|source| DocumentError::Apply {
            id: id.to_string(),
            source,
        })?;
        info!("Rejected suggestion {}", id);
        Ok(())
    }

    /// Apply every pending suggestion that is safe to apply together.
    ///
    /// Conflicting suggestions are filtered out (earlier ones win), the rest
    /// are applied bottom to top. A failure stops the batch and leaves the
    /// suggestions already applied in place.
    pub fn apply_pending(&mut self, config: &EngineConfig) -> PendingApplication {
        let detector = ConflictDetector::from_config(config);
        let pending = pending_suggestions(&self.threads);
        let mut batch = detector.filter_non_conflicting(&pending);
        let excluded: Vec<String> = pending
            .iter()
            .filter(|p| !batch.iter().any(|b| b.id == p.id))
            .map(|p| p.id.clone())
            .collect();
        sort_for_application(&self.content, &mut batch);

        let mut result = PendingApplication {
            excluded,
            ..PendingApplication::default()
        };

        for comment in &batch {
            match self.accept_suggestion(&comment.id) {
                Ok(_) => result.applied.push(comment.id.clone()),
                Err(DocumentError::Apply { id, source }) => {
                    warn!("Stopped after {} suggestion(s): {}", result.applied.len(), source);
                    result.failure = Some(BatchFailure { id, error: source });
                    break;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", comment.id, e);
                }
            }
        }

        info!(
            "Applied {} suggestion(s), excluded {} conflicting",
            result.applied.len(),
            result.excluded.len()
        );
        result
    }

    /// Replace the content after an edit made outside the engine. Anchors
    /// are carried over by diffing the two snapshots, then validated.
    pub fn replace_content(
        &mut self,
        new_content: impl Into<String>,
        config: &EngineConfig,
        outline: Option<&dyn Outline>,
    ) -> ValidationReport {
        let old_content = std::mem::replace(&mut self.content, new_content.into());
        let mapping = LineMapping::compute(
            &old_content,
            &self.content,
            config.line_mapping,
            config.diff_lookahead,
        );

        let new_content = &self.content;
        for_each_comment_mut(&mut self.threads, &mut |c| {
            map_across_diff(c, &mapping, &old_content, new_content);
        });

        self.document_hash = compute_document_hash(&self.content);
        self.validate(outline)
    }

    pub fn validate(&mut self, outline: Option<&dyn Outline>) -> ValidationReport {
        let report = validate(&self.content, &mut self.threads, outline);
        self.last_validated = Some(now());
        report
    }
}

/// Move one comment across a known edit
fn shift_across_edit(comment: &mut Comment, edit: &AppliedEdit, old: &str, new: &str) {
    let line_edit = edit.line_edit;
    comment.line = line_edit.shift_line(comment.line);

    let map_offset = edit
        .byte_edit
        .map(|b| move |offset: usize| b.shift_offset(offset));
    move_selection(comment, old, new, &|line| line_edit.shift_line(line), map_offset);
}

/// Move one comment across an unstructured rewrite
fn map_across_diff(comment: &mut Comment, mapping: &LineMapping, old: &str, new: &str) {
    comment.line = mapping.map_line(comment.line);
    move_selection(comment, old, new, &|line| mapping.map_line(line), None::<fn(usize) -> usize>);
}

/// Move a pending suggestion's selection. Line kinds go through `map_line`;
/// byte offsets use `map_offset` when the edit was byte-level, otherwise
/// they are carried through their line and column.
fn move_selection<F>(
    comment: &mut Comment,
    old: &str,
    new: &str,
    map_line: &dyn Fn(usize) -> usize,
    map_offset: Option<F>,
) where
    F: Fn(usize) -> usize,
{
    let Some(suggestion) = comment.suggestion.as_mut() else {
        return;
    };
    if !suggestion.is_pending() {
        return;
    }
    let selection = &mut suggestion.selection;

    match suggestion.kind {
        SelectionKind::Line | SelectionKind::MultiLine => {
            selection.start_line = map_line(selection.start_line);
            if let Some(end) = selection.end_line {
                selection.end_line = Some(map_line(end).max(selection.start_line));
            }
        }
        SelectionKind::DiffHunk => {
            if selection.start_line > 0 {
                selection.start_line = map_line(selection.start_line);
                if let Some(end) = selection.end_line {
                    selection.end_line = Some(map_line(end).max(selection.start_line));
                }
            }
            let Some(header) = suggestion
                .proposed_text
                .lines()
                .next()
                .and_then(|l| HunkHeader::parse(l).ok())
            else {
                return;
            };
            if header.old_start > 0 {
                let moved = map_line(header.old_start);
                if moved != header.old_start {
                    if let Ok(text) = relocate(&suggestion.proposed_text, moved) {
                        suggestion.proposed_text = text;
                    }
                }
            }
        }
        SelectionKind::CharRange => {
            let Some(offset) = selection.byte_offset else {
                return;
            };
            let moved = match map_offset {
                Some(f) => f(offset),
                None => {
                    let (line, column) = line_column_at(old, offset);
                    recompute_byte_offset(new, map_line(line), column)
                }
            };
            selection.byte_offset = Some(moved);
        }
    }
}
