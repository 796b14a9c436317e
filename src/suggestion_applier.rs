// src/suggestion_applier.rs
//! Applies suggestions to document content.
//!
//! Application is pure with respect to content: a new string is returned
//! together with the edited region, and the caller is responsible for
//! flipping the acceptance state and re-anchoring other comments.

use log::{debug, warn};

use crate::error::ApplyError;
use crate::hunk::{HunkLine, ParsedHunk};
use crate::models::{Comment, SelectionKind, Suggestion};
use crate::position_tracker::{line_column_at, ByteEdit, LineEdit};
use crate::text::{join_lines, split_lines};

/// New content plus the region that changed, for re-anchoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub content: String,
    pub line_edit: LineEdit,
    /// Set for CharRange edits, whose byte anchors can be shifted directly
    pub byte_edit: Option<ByteEdit>,
}

/// Apply one suggestion. The acceptance state is not consulted here; use
/// `apply_comment` to enforce at-most-once application.
pub fn apply_suggestion(content: &str, suggestion: &Suggestion) -> Result<AppliedEdit, ApplyError> {
    let selection = &suggestion.selection;
    match suggestion.kind {
        SelectionKind::Line => apply_line_range(
            content,
            selection.start_line,
            selection.effective_end_line(),
            &selection.original,
            &suggestion.proposed_text,
        ),
        SelectionKind::MultiLine => {
            let end = selection
                .end_line
                .ok_or(ApplyError::IncompleteSelection("an end line"))?;
            apply_line_range(
                content,
                selection.start_line,
                end,
                &selection.original,
                &suggestion.proposed_text,
            )
        }
        SelectionKind::CharRange => apply_char_range(content, suggestion),
        SelectionKind::DiffHunk => apply_diff_hunk(content, suggestion),
    }
}

/// Apply the suggestion carried by `comment`, refusing anything already
/// accepted or rejected
pub fn apply_comment(content: &str, comment: &Comment) -> Result<AppliedEdit, ApplyError> {
    let suggestion = comment
        .suggestion
        .as_ref()
        .ok_or_else(|| ApplyError::NotASuggestion(comment.id.clone()))?;
    if !suggestion.is_pending() {
        return Err(ApplyError::NotPending {
            id: comment.id.clone(),
            state: suggestion.acceptance,
        });
    }
    apply_suggestion(content, suggestion)
}

fn apply_line_range(
    content: &str,
    start: usize,
    end: usize,
    original: &str,
    proposed: &str,
) -> Result<AppliedEdit, ApplyError> {
    let (lines, trailing_newline) = split_lines(content);
    if start == 0 || end < start || end > lines.len() {
        return Err(ApplyError::LineOutOfRange {
            start,
            end,
            line_count: lines.len(),
        });
    }

    if !original.is_empty() {
        let current = lines[start - 1..end].join("\n");
        if current != original {
            return Err(ApplyError::OriginalTextMismatch {
                expected: original.to_string(),
                actual: current,
            });
        }
    }

    // An empty proposal deletes the range
    let (replacement, _) = split_lines(proposed);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + replacement.len());
    out.extend_from_slice(&lines[..start - 1]);
    out.extend_from_slice(&replacement);
    out.extend_from_slice(&lines[end..]);

    debug!(
        "Replaced lines {}-{} with {} line(s)",
        start,
        end,
        replacement.len()
    );

    Ok(AppliedEdit {
        content: join_lines(&out, trailing_newline),
        line_edit: LineEdit::replace(start, end, replacement.len()),
        byte_edit: None,
    })
}

fn apply_char_range(content: &str, suggestion: &Suggestion) -> Result<AppliedEdit, ApplyError> {
    let selection = &suggestion.selection;
    let offset = selection
        .byte_offset
        .ok_or(ApplyError::IncompleteSelection("a byte offset"))?;
    let length = selection.length.unwrap_or(selection.original.len());

    let out_of_range = ApplyError::OffsetOutOfRange {
        offset,
        length,
        content_len: content.len(),
    };
    let end = offset.checked_add(length).ok_or_else(|| out_of_range.clone())?;
    if end > content.len() || !content.is_char_boundary(offset) || !content.is_char_boundary(end) {
        return Err(out_of_range);
    }

    let current = &content[offset..end];
    if !selection.original.is_empty() && current != selection.original {
        return Err(ApplyError::OriginalTextMismatch {
            expected: selection.original.clone(),
            actual: current.to_string(),
        });
    }

    let proposed = &suggestion.proposed_text;
    let mut out = String::with_capacity(content.len() - length + proposed.len());
    out.push_str(&content[..offset]);
    out.push_str(proposed);
    out.push_str(&content[end..]);

    // Line view of the same edit: the lines spanned by the removed bytes
    // become one line plus however many newlines the proposal carries
    let (start_line, _) = line_column_at(content, offset);
    let removed_newlines = current.matches('\n').count();
    let added_newlines = proposed.matches('\n').count();

    debug!("Replaced bytes {}..{} with {} byte(s)", offset, end, proposed.len());

    Ok(AppliedEdit {
        content: out,
        line_edit: LineEdit::replace(start_line, start_line + removed_newlines, 1 + added_newlines),
        byte_edit: Some(ByteEdit {
            offset,
            old_len: length,
            new_len: proposed.len(),
        }),
    })
}

fn apply_diff_hunk(content: &str, suggestion: &Suggestion) -> Result<AppliedEdit, ApplyError> {
    let hunk = ParsedHunk::parse(&suggestion.proposed_text)?;
    let (lines, trailing_newline) = split_lines(content);
    let line_count = lines.len();

    let skip = hunk.header.lines_before();
    if skip > line_count {
        return Err(ApplyError::LineOutOfRange {
            start: hunk.header.old_start,
            end: hunk.header.old_start,
            line_count,
        });
    }

    let original = &suggestion.selection.original;
    if !original.is_empty() {
        let end = (skip + hunk.old_line_count()).min(line_count);
        let current = lines[skip..end].join("\n");
        if &current != original {
            return Err(ApplyError::OriginalTextMismatch {
                expected: original.clone(),
                actual: current,
            });
        }
    }

    let mut out: Vec<&str> = lines[..skip].to_vec();
    let mut cursor = skip;
    let mut emitted = 0;

    for line in &hunk.lines {
        match line {
            HunkLine::Context(_) => {
                let source = lines.get(cursor).ok_or(ApplyError::LineOutOfRange {
                    start: cursor + 1,
                    end: cursor + 1,
                    line_count,
                })?;
                out.push(source);
                cursor += 1;
                emitted += 1;
            }
            HunkLine::Remove(_) => {
                if cursor >= line_count {
                    return Err(ApplyError::LineOutOfRange {
                        start: cursor + 1,
                        end: cursor + 1,
                        line_count,
                    });
                }
                cursor += 1;
            }
            HunkLine::Add(text) => {
                out.push(text);
                emitted += 1;
            }
        }
    }
    out.extend_from_slice(&lines[cursor..]);

    debug!(
        "Applied hunk over lines {}-{} ({} line(s) emitted)",
        skip + 1,
        cursor,
        emitted
    );

    Ok(AppliedEdit {
        content: join_lines(&out, trailing_newline),
        line_edit: LineEdit::replace(skip + 1, cursor, emitted),
        byte_edit: None,
    })
}

/// Outcome of `apply_multiple`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Content after every successful application
    pub content: String,
    /// Ids applied, in order
    pub applied: Vec<String>,
    /// The suggestion that stopped the batch, if any
    pub failure: Option<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub error: ApplyError,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Apply suggestions in the given order. Anything that is not a pending
/// suggestion is skipped. A failure stops the batch but keeps the work
/// already done, so callers can report partial progress.
pub fn apply_multiple(content: &str, suggestions: &[Comment]) -> BatchOutcome {
    let mut current = content.to_string();
    let mut applied = Vec::new();

    for comment in suggestions {
        if !comment.is_pending_suggestion() {
            debug!("Skipping {}: not a pending suggestion", comment.id);
            continue;
        }
        match apply_comment(&current, comment) {
            Ok(edit) => {
                current = edit.content;
                applied.push(comment.id.clone());
            }
            Err(error) => {
                warn!(
                    "Batch stopped at {} after {} applied: {}",
                    comment.id,
                    applied.len(),
                    error
                );
                return BatchOutcome {
                    content: current,
                    applied,
                    failure: Some(BatchFailure {
                        id: comment.id.clone(),
                        error,
                    }),
                };
            }
        }
    }

    BatchOutcome {
        content: current,
        applied,
        failure: None,
    }
}
