// src/conflict_detector.rs
//! Detects conflicts between pending suggestions by comparing the ranges
//! they touch, and plans a batch that is safe to apply in one pass.

use std::cmp::Reverse;

use log::debug;

use crate::config::EngineConfig;
use crate::models::{Comment, Conflict, ConflictKind, SelectionKind};
use crate::position_tracker::recompute_byte_offset;

pub const DEFAULT_BYTE_ADJACENCY: usize = 10;
pub const DEFAULT_LINE_ADJACENCY: usize = 1;

/// Pairwise classifier for suggestion ranges
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    /// Gap in bytes under which disjoint CharRange edits are adjacent
    byte_adjacency: usize,
    /// Gap in lines under which disjoint line ranges are adjacent
    line_adjacency: usize,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BYTE_ADJACENCY, DEFAULT_LINE_ADJACENCY)
    }
}

impl ConflictDetector {
    pub fn new(byte_adjacency: usize, line_adjacency: usize) -> Self {
        Self {
            byte_adjacency,
            line_adjacency,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.byte_adjacency, config.line_adjacency)
    }

    /// Classify two suggestions. Comments without a suggestion, and pairs
    /// mixing byte and line geometry, are never in conflict.
    pub fn classify(&self, a: &Comment, b: &Comment) -> ConflictKind {
        let (Some(sa), Some(sb)) = (a.suggestion.as_ref(), b.suggestion.as_ref()) else {
            return ConflictKind::None;
        };

        match (sa.kind, sb.kind) {
            (SelectionKind::CharRange, SelectionKind::CharRange) => {
                match (sa.byte_range(), sb.byte_range()) {
                    (Some(ra), Some(rb)) => self.classify_bytes(ra, rb),
                    _ => ConflictKind::None,
                }
            }
            (ka, kb) if ka.is_line_oriented() && kb.is_line_oriented() => {
                match (sa.line_range(), sb.line_range()) {
                    (Some(ra), Some(rb)) => self.classify_lines(ra, rb),
                    _ => ConflictKind::None,
                }
            }
            _ => ConflictKind::None,
        }
    }

    /// Half-open `[start, end)` byte ranges
    fn classify_bytes(&self, a: (usize, usize), b: (usize, usize)) -> ConflictKind {
        // Two inserts at the same position conflict
        if a.0 == a.1 && b.0 == b.1 && a.0 == b.0 {
            return ConflictKind::Overlap;
        }

        if a.0 < b.1 && b.0 < a.1 {
            return ConflictKind::Overlap;
        }

        let gap = if a.1 <= b.0 { b.0 - a.1 } else { a.0 - b.1 };
        if gap <= self.byte_adjacency {
            ConflictKind::Adjacent
        } else {
            ConflictKind::None
        }
    }

    /// Inclusive `[start, end]` line ranges
    fn classify_lines(&self, a: (usize, usize), b: (usize, usize)) -> ConflictKind {
        if a == b {
            return ConflictKind::SameLine;
        }

        let a_contains_b = a.0 <= b.0 && b.1 <= a.1;
        let b_contains_a = b.0 <= a.0 && a.1 <= b.1;
        if a_contains_b || b_contains_a {
            return ConflictKind::Nested;
        }

        if a.0 <= b.1 && b.0 <= a.1 {
            return ConflictKind::Overlap;
        }

        let gap = if a.1 < b.0 { b.0 - a.1 } else { a.0 - b.1 };
        if gap <= self.line_adjacency {
            ConflictKind::Adjacent
        } else {
            ConflictKind::None
        }
    }

    /// Every non-None relationship between pending suggestions, in input order
    pub fn detect_conflicts(&self, suggestions: &[Comment]) -> Vec<Conflict> {
        let pending: Vec<&Comment> = suggestions
            .iter()
            .filter(|c| c.is_pending_suggestion())
            .collect();

        let mut conflicts = Vec::new();

        // Compare all pairs
        for i in 0..pending.len() {
            for j in (i + 1)..pending.len() {
                let kind = self.classify(pending[i], pending[j]);
                if kind == ConflictKind::None {
                    continue;
                }
                conflicts.push(create_conflict(kind, pending[i], pending[j]));
            }
        }

        debug!(
            "Found {} conflict(s) among {} pending suggestion(s)",
            conflicts.len(),
            pending.len()
        );
        conflicts
    }

    /// For every blocking pair among the pending inputs keep the first and
    /// exclude the second. Non-suggestions and already resolved suggestions
    /// pass through.
    pub fn filter_non_conflicting(&self, suggestions: &[Comment]) -> Vec<Comment> {
        let mut excluded = vec![false; suggestions.len()];

        for i in 0..suggestions.len() {
            if !suggestions[i].is_pending_suggestion() {
                continue;
            }
            for j in (i + 1)..suggestions.len() {
                if !suggestions[j].is_pending_suggestion() {
                    continue;
                }
                if self.classify(&suggestions[i], &suggestions[j]).is_blocking() {
                    debug!(
                        "Excluding {}: conflicts with {}",
                        suggestions[j].id, suggestions[i].id
                    );
                    excluded[j] = true;
                }
            }
        }

        suggestions
            .iter()
            .zip(excluded)
            .filter(|(_, skip)| !skip)
            .map(|(c, _)| c.clone())
            .collect()
    }
}

/// True if any conflict makes independent application unsafe
pub fn has_conflicts(conflicts: &[Conflict]) -> bool {
    conflicts.iter().any(|c| c.kind.is_blocking())
}

/// Bottom-to-top order by where each edit starts in `content`: the byte
/// offset for CharRange, the start of the first line for line kinds.
/// Applying in this order never shifts a suggestion that is still waiting.
pub fn sort_for_application(content: &str, suggestions: &mut [Comment]) {
    suggestions.sort_by_key(|c| Reverse(start_position(content, c)));
}

fn start_position(content: &str, comment: &Comment) -> usize {
    let Some(suggestion) = comment.suggestion.as_ref() else {
        return recompute_byte_offset(content, comment.line, 0);
    };
    match suggestion.byte_range() {
        Some((start, _)) => start,
        None => {
            let line = suggestion
                .line_range()
                .map(|(start, _)| start)
                .unwrap_or(comment.line);
            recompute_byte_offset(content, line, 0)
        }
    }
}

fn create_conflict(kind: ConflictKind, a: &Comment, b: &Comment) -> Conflict {
    let description = match kind {
        ConflictKind::Overlap => format!("{} and {} edit overlapping text", a.id, b.id),
        ConflictKind::Nested => format!("one of {} and {} contains the other", a.id, b.id),
        ConflictKind::SameLine => format!("{} and {} replace the same lines", a.id, b.id),
        ConflictKind::Adjacent => format!("{} and {} edit neighbouring text", a.id, b.id),
        ConflictKind::None => String::new(),
    };

    Conflict {
        kind,
        a: a.id.clone(),
        b: b.id.clone(),
        description,
    }
}
