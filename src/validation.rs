// src/validation.rs
//! Checks comment anchors against the current content.
//!
//! A failed check never removes a comment. The comment is marked orphaned
//! with a reason and the issue is reported, so a stale anchor is flagged
//! rather than lost.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{now, Comment, CommentStatus, SelectionKind};
use crate::outline::Outline;
use crate::text::line_count;
use crate::threads::for_each_comment_mut;

/// Advisory record of a comment that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub comment_id: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Active comments examined
    pub checked: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Hex SHA-256 of the content
pub fn compute_document_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn is_stale(stored_hash: &str, content: &str) -> bool {
    stored_hash != compute_document_hash(content)
}

/// Validate every active comment in the forest, replies included.
/// Orphaned and completed comments are skipped.
pub fn validate(content: &str, threads: &mut [Comment], outline: Option<&dyn Outline>) -> ValidationReport {
    let lines = line_count(content);
    let mut report = ValidationReport::default();

    for_each_comment_mut(threads, &mut |comment| {
        if comment.status != CommentStatus::Active {
            return;
        }
        report.checked += 1;

        if let Some(reason) = check_comment(comment, content, lines, outline) {
            warn!("Comment {} orphaned: {}", comment.id, reason);
            report.issues.push(ValidationIssue {
                comment_id: comment.id.clone(),
                line: comment.line,
                reason: reason.clone(),
            });
            comment.status = CommentStatus::Orphaned;
            comment.original_line = Some(comment.line);
            comment.orphaned_reason = Some(reason);
        }
    });

    debug!(
        "Validated {} comment(s), {} issue(s)",
        report.checked,
        report.issues.len()
    );
    report
}

fn check_comment(
    comment: &Comment,
    content: &str,
    lines: usize,
    outline: Option<&dyn Outline>,
) -> Option<String> {
    if comment.line < 1 || comment.line > lines {
        return Some(format!(
            "line {} is outside the document ({} lines)",
            comment.line, lines
        ));
    }

    if let (Some(path), Some(outline)) = (comment.section_path.as_deref(), outline) {
        if outline.find_section(path).is_none() {
            return Some(format!("section '{}' no longer exists", path));
        }
    }

    // Decided suggestions keep the selection they were decided on
    let suggestion = comment.suggestion.as_ref().filter(|s| s.is_pending())?;
    if suggestion.kind == SelectionKind::CharRange {
        let (start, end) = suggestion.byte_range()?;
        if end > content.len() {
            return Some(format!(
                "suggested bytes {}..{} are outside the document ({} bytes)",
                start,
                end,
                content.len()
            ));
        }
    } else if let Some((start, end)) = suggestion.line_range() {
        if start < 1 || end > lines {
            return Some(format!(
                "suggested lines {}-{} are outside the document ({} lines)",
                start, end, lines
            ));
        }
    }
    None
}

/// Outcome of reconciling stored threads with current content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub document_hash: String,
    pub last_validated: Option<DateTime<Utc>>,
    /// Present only when the content changed since the hash was stored
    pub report: Option<ValidationReport>,
}

/// Compare the stored hash with the content. An unchanged document keeps
/// its threads as they are; a changed one gets per-comment validation, so
/// only the anchors that no longer fit are orphaned.
pub fn reconcile(
    content: &str,
    threads: &mut [Comment],
    stored_hash: Option<&str>,
    outline: Option<&dyn Outline>,
) -> Reconciliation {
    let document_hash = compute_document_hash(content);
    if stored_hash == Some(document_hash.as_str()) {
        debug!("Document unchanged since last save, skipping validation");
        return Reconciliation {
            document_hash,
            last_validated: None,
            report: None,
        };
    }

    let report = validate(content, threads, outline);
    info!(
        "Document changed, {} of {} comment(s) orphaned",
        report.issues.len(),
        report.checked
    );
    Reconciliation {
        document_hash,
        last_validated: Some(now()),
        report: Some(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use crate::models::{Selection, Suggestion};
    use crate::outline::MarkdownOutline;

    fn thirty_lines() -> String {
        (1..=30).map(|i| format!("line {}\n", i)).collect()
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            compute_document_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(is_stale("abc", "content"));
        assert!(!is_stale(&compute_document_hash("content"), "content"));
    }

    #[test]
    fn test_truncated_document_orphans_comment() {
        let ids = SequentialIdGenerator::default();
        let mut threads = vec![
            Comment::new(&ids, "alice", "far down", 50),
            Comment::new(&ids, "bob", "fine", 12),
        ];
        let content = thirty_lines();

        let report = validate(&content, &mut threads, None);
        assert_eq!(report.checked, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(threads[0].status, CommentStatus::Orphaned);
        assert_eq!(threads[0].original_line, Some(50));
        let reason = threads[0].orphaned_reason.as_deref().unwrap();
        assert!(reason.contains("line 50"), "{}", reason);
        assert!(reason.contains("30 lines"), "{}", reason);
        assert_eq!(threads[1].status, CommentStatus::Active);

        // orphaned comments are not checked again
        let again = validate(&content, &mut threads, None);
        assert_eq!(again.checked, 1);
        assert!(again.is_clean());
    }

    #[test]
    fn test_missing_section_orphans_comment() {
        let ids = SequentialIdGenerator::default();
        let content = "# Intro\ntext\n# Details\nmore\n";
        let outline = MarkdownOutline::extract(content);
        let mut threads = vec![
            Comment::new(&ids, "alice", "kept", 2).with_section("intro", "Intro"),
            Comment::new(&ids, "bob", "gone", 4).with_section("old", "Intro > Old"),
        ];

        let report = validate(content, &mut threads, Some(&outline));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].comment_id, "c2");
        assert_eq!(threads[0].status, CommentStatus::Active);
    }

    #[test]
    fn test_suggestion_range_checked() {
        let ids = SequentialIdGenerator::default();
        let lines = Suggestion::new(SelectionKind::MultiLine, Selection::lines(2, 9), "x");
        let bytes = Suggestion::new(SelectionKind::CharRange, Selection::bytes(2, 40), "x");
        let mut threads = vec![
            Comment::new_suggestion(&ids, "alice", "", lines),
            Comment::new_suggestion(&ids, "bob", "", bytes),
        ];
        let report = validate("a\nb\nc\n", &mut threads, None);
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn test_decided_suggestion_range_not_checked() {
        let ids = SequentialIdGenerator::default();
        let suggestion = Suggestion::new(SelectionKind::Line, Selection::line(5), "x");
        let mut rejected = Comment::new_suggestion(&ids, "alice", "", suggestion);
        rejected.reject().unwrap();
        rejected.line = 2;
        let mut threads = vec![rejected];

        let report = validate("a\nb\nc\n", &mut threads, None);
        assert!(report.is_clean());
        assert_eq!(threads[0].status, CommentStatus::Active);
    }

    #[test]
    fn test_overflowing_byte_range_is_orphaned() {
        let ids = SequentialIdGenerator::default();
        let suggestion = Suggestion::new(SelectionKind::CharRange, Selection::bytes(3, usize::MAX), "x");
        let mut threads = vec![Comment::new_suggestion(&ids, "alice", "", suggestion)];

        let report = validate("abcdef", &mut threads, None);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(threads[0].status, CommentStatus::Orphaned);
    }

    #[test]
    fn test_replies_are_validated() {
        let ids = SequentialIdGenerator::default();
        let mut root = Comment::new(&ids, "alice", "root", 1);
        root.reply(&ids, "bob", "reply");
        root.replies[0].line = 9;
        let mut threads = vec![root];
        let report = validate("one line", &mut threads, None);
        assert_eq!(report.issues[0].comment_id, "c2");
    }

    #[test]
    fn test_reconcile_only_when_changed() {
        let ids = SequentialIdGenerator::default();
        let content = "a\nb\n";
        let mut threads = vec![Comment::new(&ids, "alice", "gone", 7)];

        let hash = compute_document_hash(content);
        let unchanged = reconcile(content, &mut threads, Some(hash.as_str()), None);
        assert!(unchanged.report.is_none());
        assert_eq!(threads[0].status, CommentStatus::Active);

        let changed = reconcile(content, &mut threads, Some("stale"), None);
        assert_eq!(changed.report.map(|r| r.issues.len()), Some(1));
        assert!(changed.last_validated.is_some());
        assert_eq!(threads[0].status, CommentStatus::Orphaned);
    }
}
