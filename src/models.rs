// src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApplyError;
use crate::hunk::{build_hunk, HunkHeader};
use crate::ids::IdGenerator;

/// Author used when a marker carries no metadata
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Closed set of comment categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentType {
    Question,
    Suggestion,
    Blocker,
    Technical,
    Editorial,
}

impl CommentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentType::Question => "Question",
            CommentType::Suggestion => "Suggestion",
            CommentType::Blocker => "Blocker",
            CommentType::Technical => "Technical",
            CommentType::Editorial => "Editorial",
        }
    }
}

impl fmt::Display for CommentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "question" => Ok(CommentType::Question),
            "suggestion" => Ok(CommentType::Suggestion),
            "blocker" => Ok(CommentType::Blocker),
            "technical" => Ok(CommentType::Technical),
            "editorial" => Ok(CommentType::Editorial),
            other => Err(format!("unknown comment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    #[default]
    Active,
    Orphaned,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Review state of a suggestion. `Pending` moves one way to either terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcceptanceState {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Geometry of the text a suggestion replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Lines `[start, end]`, end defaults to start
    Line,
    /// Raw bytes `[offset, offset + length)`
    CharRange,
    /// Lines `[start, end]` with an explicit end
    MultiLine,
    /// A single unified-diff hunk carried in `proposed_text`
    DiffHunk,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::Line => "line",
            SelectionKind::CharRange => "char_range",
            SelectionKind::MultiLine => "multi_line",
            SelectionKind::DiffHunk => "diff_hunk",
        }
    }

    /// Line, MultiLine and DiffHunk all compare by line range
    pub fn is_line_oriented(&self) -> bool {
        !matches!(self, SelectionKind::CharRange)
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionKind {
    type Err = ApplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(SelectionKind::Line),
            "char_range" => Ok(SelectionKind::CharRange),
            "multi_line" => Ok(SelectionKind::MultiLine),
            "diff_hunk" => Ok(SelectionKind::DiffHunk),
            other => Err(ApplyError::UnknownSelectionKind(other.to_string())),
        }
    }
}

/// The span of text a suggestion proposes to replace.
///
/// Line fields are 1-indexed. `original` is the text expected at the
/// location; when non-empty it is checked before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default)]
    pub start_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original: String,
}

impl Selection {
    pub fn line(start_line: usize) -> Self {
        Self {
            start_line,
            ..Self::default()
        }
    }

    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: Some(end_line),
            ..Self::default()
        }
    }

    pub fn bytes(byte_offset: usize, length: usize) -> Self {
        Self {
            byte_offset: Some(byte_offset),
            length: Some(length),
            ..Self::default()
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original = original.into();
        self
    }

    pub fn effective_end_line(&self) -> usize {
        self.end_line.unwrap_or(self.start_line)
    }
}

/// Proposed edit payload carried by a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub kind: SelectionKind,
    pub selection: Selection,
    pub proposed_text: String,
    #[serde(default)]
    pub acceptance: AcceptanceState,
}

impl Suggestion {
    pub fn new(kind: SelectionKind, selection: Selection, proposed_text: impl Into<String>) -> Self {
        Self {
            kind,
            selection,
            proposed_text: proposed_text.into(),
            acceptance: AcceptanceState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.acceptance == AcceptanceState::Pending
    }

    /// Inclusive line range for line-oriented kinds.
    ///
    /// DiffHunk falls back to the old range in its header when the
    /// selection carries no start line.
    pub fn line_range(&self) -> Option<(usize, usize)> {
        match self.kind {
            SelectionKind::CharRange => None,
            SelectionKind::Line | SelectionKind::MultiLine => {
                let start = self.selection.start_line;
                Some((start, self.selection.effective_end_line().max(start)))
            }
            SelectionKind::DiffHunk => {
                if self.selection.start_line > 0 {
                    let start = self.selection.start_line;
                    return Some((start, self.selection.effective_end_line().max(start)));
                }
                let header = HunkHeader::parse(self.proposed_text.lines().next()?).ok()?;
                Some(header.old_range())
            }
        }
    }

    /// Half-open byte range `[offset, offset + length)` for CharRange
    pub fn byte_range(&self) -> Option<(usize, usize)> {
        if self.kind != SelectionKind::CharRange {
            return None;
        }
        let offset = self.selection.byte_offset?;
        let length = self
            .selection
            .length
            .unwrap_or(self.selection.original.len());
        // An overflowing length reaches past any document
        Some((offset, offset.saturating_add(length)))
    }

    /// DiffHunk suggestion turning `old` into `new`, or None when they match
    pub fn from_rewrite(old: &str, new: &str, context: usize) -> Option<Self> {
        let hunk = build_hunk(old, new, context)?;
        Some(Self::new(SelectionKind::DiffHunk, Selection::default(), hunk))
    }
}

/// A node in a comment thread.
///
/// Replies are owned by their parent; the link back to the thread is the
/// `thread_id` value, never a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub thread_id: String,
    pub author: String,
    /// Whole seconds, the precision markers carry. Constructors and
    /// sidecar loading both truncate.
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub comment_type: Option<CommentType>,
    /// Current anchor line, 1-indexed
    pub line: usize,
    /// Anchor line at the time the comment was orphaned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub status: CommentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned_reason: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl Comment {
    /// New root comment; its thread id is its own id
    pub fn new(ids: &dyn IdGenerator, author: &str, text: &str, line: usize) -> Self {
        let id = ids.next_id();
        Self::from_identity(id.clone(), id, author, now(), text, line)
    }

    /// New root comment proposing an edit, anchored at the edit's first line
    pub fn new_suggestion(
        ids: &dyn IdGenerator,
        author: &str,
        text: &str,
        suggestion: Suggestion,
    ) -> Self {
        let line = suggestion
            .line_range()
            .map(|(start, _)| start)
            .unwrap_or(1)
            .max(1);
        let mut comment = Self::new(ids, author, text, line);
        comment.comment_type = Some(CommentType::Suggestion);
        comment.suggestion = Some(suggestion);
        comment
    }

    pub(crate) fn from_identity(
        id: String,
        thread_id: String,
        author: &str,
        created_at: DateTime<Utc>,
        text: &str,
        line: usize,
    ) -> Self {
        Self {
            id,
            thread_id,
            author: sanitize_author(author),
            created_at,
            text: text.to_string(),
            comment_type: None,
            line,
            original_line: None,
            section_id: None,
            section_path: None,
            resolved: false,
            status: CommentStatus::Active,
            orphaned_reason: None,
            priority: Priority::Medium,
            replies: Vec::new(),
            suggestion: None,
        }
    }

    pub fn with_type(mut self, comment_type: CommentType) -> Self {
        self.comment_type = Some(comment_type);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_section(mut self, section_id: &str, section_path: &str) -> Self {
        self.section_id = Some(section_id.to_string());
        self.section_path = Some(section_path.to_string());
        self
    }

    pub fn is_suggestion(&self) -> bool {
        self.suggestion.is_some()
    }

    pub fn is_pending_suggestion(&self) -> bool {
        self.suggestion.as_ref().is_some_and(Suggestion::is_pending)
    }

    pub fn acceptance(&self) -> Option<AcceptanceState> {
        self.suggestion.as_ref().map(|s| s.acceptance)
    }

    /// Line used to order suggestions: the selection start for line kinds,
    /// the comment anchor otherwise
    pub fn anchor_line(&self) -> usize {
        self.suggestion
            .as_ref()
            .and_then(Suggestion::line_range)
            .map(|(start, _)| start)
            .unwrap_or(self.line)
    }
}

/// Replace the characters the marker codec treats as structure
pub fn sanitize_id(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| if matches!(c, ':' | '[' | ']') { '-' } else { c })
        .collect()
}

/// Like `sanitize_id`, with `unknown` standing in for an empty author
pub fn sanitize_author(author: &str) -> String {
    let cleaned = sanitize_id(author);
    if cleaned.is_empty() {
        UNKNOWN_AUTHOR.to_string()
    } else {
        cleaned
    }
}

/// Wall-clock time truncated to whole seconds, the marker timestamp precision
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Result of classifying two pending suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    None,
    /// Ranges partially overlap
    Overlap,
    /// One range fully contains the other
    Nested,
    /// Close but disjoint; advisory only
    Adjacent,
    /// Identical line ranges
    SameLine,
}

impl ConflictKind {
    /// Blocking conflicts make independent application unsafe
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ConflictKind::Overlap | ConflictKind::Nested | ConflictKind::SameLine
        )
    }
}

/// Ephemeral pairwise relationship between two suggestions, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub a: String,
    pub b: String,
    pub description: String,
}
