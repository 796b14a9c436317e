// src/position_tracker.rs
//! Keeps comment and suggestion anchors valid as the document changes.
//!
//! Two situations are handled:
//! - the edited region is known (an accepted suggestion): anchors are shifted
//!   arithmetically with a `LineEdit` or `ByteEdit`, no document scan needed;
//! - the content was replaced wholesale: a `LineMapping` between the two
//!   snapshots is computed and every anchor is mapped through it.
//!
//! Nothing here fails. Anchor tracking is best-effort metadata and results
//! are clamped, the verified `original` text check in the applier is the
//! ground truth.

use log::debug;
use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::text::split_lines;

/// Default re-sync window for the greedy line mapping
pub const DEFAULT_LOOKAHEAD: usize = 5;

/// A known line-level edit: lines `[start_line, end_line]` were replaced by
/// `new_line_count` lines. `end_line == start_line - 1` is a pure insertion
/// before `start_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEdit {
    pub start_line: usize,
    pub end_line: usize,
    pub new_line_count: usize,
}

impl LineEdit {
    pub fn replace(start_line: usize, end_line: usize, new_line_count: usize) -> Self {
        Self {
            start_line,
            end_line,
            new_line_count,
        }
    }

    pub fn insert(before_line: usize, new_line_count: usize) -> Self {
        Self {
            start_line: before_line,
            end_line: before_line.saturating_sub(1),
            new_line_count,
        }
    }

    pub fn old_line_count(&self) -> usize {
        (self.end_line + 1).saturating_sub(self.start_line)
    }

    pub fn delta(&self) -> isize {
        self.new_line_count as isize - self.old_line_count() as isize
    }

    /// Where `line` ends up after the edit. Lines before the region are
    /// untouched, lines inside collapse to its start, lines after shift.
    pub fn shift_line(&self, line: usize) -> usize {
        if line < self.start_line {
            line
        } else if line <= self.end_line {
            self.start_line
        } else {
            (line as isize + self.delta()).max(1) as usize
        }
    }
}

/// A known byte-level edit: `old_len` bytes at `offset` became `new_len` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteEdit {
    pub offset: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl ByteEdit {
    pub fn shift_offset(&self, offset: usize) -> usize {
        if offset < self.offset {
            offset
        } else if offset < self.offset.saturating_add(self.old_len) {
            self.offset
        } else {
            (offset - self.old_len).saturating_add(self.new_len)
        }
    }
}

/// Shift every anchor across a known edit. Returns how many anchors moved.
pub fn reanchor_after_known_edit<'a>(
    edit: &LineEdit,
    anchors: impl IntoIterator<Item = &'a mut usize>,
) -> usize {
    let mut moved = 0;
    for anchor in anchors {
        let next = edit.shift_line(*anchor);
        if next != *anchor {
            debug!("Re-anchored line {} -> {}", anchor, next);
            *anchor = next;
            moved += 1;
        }
    }
    moved
}

/// Shift byte-offset anchors across a known byte edit
pub fn reanchor_bytes_after_known_edit<'a>(
    edit: &ByteEdit,
    anchors: impl IntoIterator<Item = &'a mut usize>,
) -> usize {
    let mut moved = 0;
    for anchor in anchors {
        let next = edit.shift_offset(*anchor);
        if next != *anchor {
            *anchor = next;
            moved += 1;
        }
    }
    moved
}

/// How `ReanchorByDiff` aligns the two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMappingStrategy {
    /// Two cursors with a small lookahead window; cheap, approximate
    #[default]
    Greedy,
    /// Exact Myers diff
    Myers,
}

/// Old line -> new line (or absent when deleted), 1-indexed at the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMapping {
    map: Vec<Option<usize>>,
    new_len: usize,
}

impl LineMapping {
    pub fn compute(old: &str, new: &str, strategy: LineMappingStrategy, lookahead: usize) -> Self {
        match strategy {
            LineMappingStrategy::Greedy => Self::greedy(old, new, lookahead),
            LineMappingStrategy::Myers => Self::myers(old, new),
        }
    }

    /// Walk both snapshots in step. On a mismatch look up to `lookahead`
    /// lines ahead on each side for a re-sync point; when none is found the
    /// line is treated as replaced in place and both cursors advance.
    pub fn greedy(old: &str, new: &str, lookahead: usize) -> Self {
        let (old_lines, _) = split_lines(old);
        let (new_lines, _) = split_lines(new);
        let mut map = vec![None; old_lines.len()];

        let (mut i, mut j) = (0, 0);
        while i < old_lines.len() && j < new_lines.len() {
            if old_lines[i] == new_lines[j] {
                map[i] = Some(j);
                i += 1;
                j += 1;
                continue;
            }

            match resync(&old_lines, &new_lines, i, j, lookahead) {
                Some(Resync::Inserted(k)) => j += k,
                Some(Resync::Deleted(k)) => i += k,
                None => {
                    map[i] = Some(j);
                    i += 1;
                    j += 1;
                }
            }
        }

        Self {
            map,
            new_len: new_lines.len(),
        }
    }

    /// Exact alignment using the `similar` Myers implementation. Replaced
    /// blocks map pairwise as far as both sides reach.
    pub fn myers(old: &str, new: &str) -> Self {
        let (old_lines, _) = split_lines(old);
        let (new_lines, _) = split_lines(new);
        let mut map = vec![None; old_lines.len()];

        for op in capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines) {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if matches!(tag, DiffTag::Equal | DiffTag::Replace) {
                for (o, n) in old_range.zip(new_range) {
                    map[o] = Some(n);
                }
            }
        }

        Self {
            map,
            new_len: new_lines.len(),
        }
    }

    /// Direct mapping for a 1-indexed old line, None when it was deleted
    pub fn get(&self, old_line: usize) -> Option<usize> {
        let idx = old_line.checked_sub(1)?;
        self.map.get(idx).copied().flatten().map(|n| n + 1)
    }

    /// Map an anchor: direct mapping if the line survived, otherwise the
    /// nearest surviving line after it, else before it, else line 1
    pub fn map_line(&self, old_line: usize) -> usize {
        if self.map.is_empty() {
            return 1;
        }
        let idx = old_line.clamp(1, self.map.len()) - 1;

        let found = self.map[idx]
            .or_else(|| self.map[idx + 1..].iter().find_map(|m| *m))
            .or_else(|| self.map[..idx].iter().rev().find_map(|m| *m));

        match found {
            Some(n) => (n + 1).min(self.new_len.max(1)),
            None => 1,
        }
    }
}

enum Resync {
    Inserted(usize),
    Deleted(usize),
}

fn resync(old: &[&str], new: &[&str], i: usize, j: usize, lookahead: usize) -> Option<Resync> {
    for k in 1..=lookahead {
        if j + k < new.len() && old[i] == new[j + k] {
            return Some(Resync::Inserted(k));
        }
        if i + k < old.len() && old[i + k] == new[j] {
            return Some(Resync::Deleted(k));
        }
    }
    None
}

/// Re-anchor after an edit whose region is not known structurally.
/// Returns the mapping so callers can reuse it for other anchor kinds.
pub fn reanchor_by_diff<'a>(
    old: &str,
    new: &str,
    anchors: impl IntoIterator<Item = &'a mut usize>,
    strategy: LineMappingStrategy,
    lookahead: usize,
) -> LineMapping {
    let mapping = LineMapping::compute(old, new, strategy, lookahead);
    for anchor in anchors {
        let next = mapping.map_line(*anchor);
        if next != *anchor {
            debug!("Re-anchored line {} -> {} by diff", anchor, next);
        }
        *anchor = next;
    }
    mapping
}

/// Byte offset of `column` on 1-indexed `line`: the lengths (plus newline)
/// of every prior line plus the column, clamped to the content length
pub fn recompute_byte_offset(content: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (idx, text) in content.split('\n').enumerate() {
        if idx + 1 >= line.max(1) {
            break;
        }
        offset += text.len() + 1;
    }
    (offset + column).min(content.len())
}

/// Inverse of `recompute_byte_offset`: 1-indexed line and byte column
pub fn line_column_at(content: &str, offset: usize) -> (usize, usize) {
    let bytes = content.as_bytes();
    let offset = offset.min(bytes.len());
    let before = &bytes[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    (line, offset - line_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_edit_shifts_after_region() {
        let edit = LineEdit::replace(3, 4, 5);
        let mut anchors = vec![1, 2, 3, 4, 5, 10];
        let moved = reanchor_after_known_edit(&edit, anchors.iter_mut());
        assert_eq!(anchors, vec![1, 2, 3, 3, 8, 13]);
        assert_eq!(moved, 3);
    }

    #[test]
    fn test_known_edit_before_region_is_noop() {
        for new_count in [0, 1, 50] {
            let edit = LineEdit::replace(10, 12, new_count);
            let mut anchors = vec![1, 9];
            reanchor_after_known_edit(&edit, anchors.iter_mut());
            assert_eq!(anchors, vec![1, 9]);
        }
    }

    #[test]
    fn test_known_deletion() {
        let edit = LineEdit::replace(2, 3, 0);
        assert_eq!(edit.delta(), -2);
        assert_eq!(edit.shift_line(2), 2);
        assert_eq!(edit.shift_line(3), 2);
        assert_eq!(edit.shift_line(6), 4);
    }

    #[test]
    fn test_pure_insertion() {
        let edit = LineEdit::insert(3, 2);
        assert_eq!(edit.old_line_count(), 0);
        assert_eq!(edit.shift_line(2), 2);
        assert_eq!(edit.shift_line(3), 5);
    }

    #[test]
    fn test_byte_edit_shift() {
        let edit = ByteEdit {
            offset: 10,
            old_len: 4,
            new_len: 1,
        };
        assert_eq!(edit.shift_offset(5), 5);
        assert_eq!(edit.shift_offset(12), 10);
        assert_eq!(edit.shift_offset(14), 11);
    }

    #[test]
    fn test_greedy_single_insertion() {
        let old = "a\nb\nc\nd";
        let new = "a\nNEW\nb\nc\nd";
        let mapping = LineMapping::greedy(old, new, DEFAULT_LOOKAHEAD);
        assert_eq!(mapping.get(1), Some(1));
        assert_eq!(mapping.get(2), Some(3));
        assert_eq!(mapping.get(4), Some(5));
    }

    #[test]
    fn test_greedy_single_deletion() {
        let old = "a\nb\nc\nd";
        let new = "a\nc\nd";
        let mapping = LineMapping::greedy(old, new, DEFAULT_LOOKAHEAD);
        assert_eq!(mapping.get(2), None);
        assert_eq!(mapping.get(3), Some(2));
        // deleted line falls forward to the next survivor
        assert_eq!(mapping.map_line(2), 2);
    }

    #[test]
    fn test_greedy_replaced_line_maps_in_place() {
        let mapping = LineMapping::greedy("a\nb\nc", "a\nB\nc", DEFAULT_LOOKAHEAD);
        assert_eq!(mapping.get(2), Some(2));
    }

    #[test]
    fn test_deleted_tail_falls_back() {
        let mapping = LineMapping::greedy("a\nb\nc\nd", "a\nb", DEFAULT_LOOKAHEAD);
        assert_eq!(mapping.get(4), None);
        assert_eq!(mapping.map_line(4), 2);
        assert_eq!(mapping.map_line(99), 2);
    }

    #[test]
    fn test_everything_deleted_maps_to_line_one() {
        let mapping = LineMapping::greedy("a\nb", "", DEFAULT_LOOKAHEAD);
        assert_eq!(mapping.map_line(2), 1);
    }

    #[test]
    fn test_myers_matches_greedy_on_simple_edits() {
        let old = "one\ntwo\nthree\nfour\nfive";
        let new = "zero\none\ntwo\nfour\nfive";
        let greedy = LineMapping::greedy(old, new, DEFAULT_LOOKAHEAD);
        let myers = LineMapping::myers(old, new);
        for line in [1, 2, 4, 5] {
            assert_eq!(greedy.get(line), myers.get(line), "line {}", line);
        }
        assert_eq!(myers.get(3), None);
    }

    #[test]
    fn test_reanchor_by_diff() {
        let mut anchors = vec![1, 3];
        reanchor_by_diff(
            "a\nb\nc",
            "x\ny\na\nb\nc",
            anchors.iter_mut(),
            LineMappingStrategy::Greedy,
            DEFAULT_LOOKAHEAD,
        );
        assert_eq!(anchors, vec![3, 5]);
    }

    #[test]
    fn test_recompute_byte_offset() {
        let content = "abc\ndefg\nhi";
        assert_eq!(recompute_byte_offset(content, 1, 0), 0);
        assert_eq!(recompute_byte_offset(content, 2, 1), 5);
        assert_eq!(recompute_byte_offset(content, 3, 1), 10);
        assert_eq!(recompute_byte_offset(content, 3, 40), content.len());
        assert_eq!(recompute_byte_offset(content, 0, 2), 2);
    }

    #[test]
    fn test_line_column_roundtrip() {
        let content = "abc\ndefg\nhi";
        for offset in 0..=content.len() {
            let (line, column) = line_column_at(content, offset);
            assert_eq!(recompute_byte_offset(content, line, column), offset);
        }
    }
}
