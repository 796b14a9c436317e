// src/hunk.rs
// Unified diff hunks: parsing the `@@ -a,b +c,d @@` form carried by DiffHunk
// suggestions, and generating one from a rewrite using the `similar` crate.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::error::ApplyError;
use crate::text::split_lines;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("invalid hunk header regex")
});

/// Parsed `@@ -old_start,old_count +new_start,new_count @@` header.
/// The short `-X +A` form implies counts of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl HunkHeader {
    pub fn parse(line: &str) -> Result<Self, ApplyError> {
        let line = line.trim_end_matches('\r');
        let caps = HEADER_RE
            .captures(line)
            .ok_or_else(|| ApplyError::InvalidDiffHeader(line.to_string()))?;

        let number = |idx: usize, default: usize| -> Result<usize, ApplyError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| ApplyError::InvalidDiffHeader(line.to_string())),
                None => Ok(default),
            }
        };

        Ok(Self {
            old_start: number(1, 0)?,
            old_count: number(2, 1)?,
            new_start: number(3, 0)?,
            new_count: number(4, 1)?,
        })
    }

    /// Inclusive old line range the hunk touches (a pure insertion reports
    /// the single line it lands next to)
    pub fn old_range(&self) -> (usize, usize) {
        let start = self.old_start.max(1);
        let end = self
            .old_start
            .saturating_add(self.old_count)
            .saturating_sub(1)
            .max(start);
        (start, end)
    }

    /// Number of leading source lines copied verbatim before the hunk body.
    /// With a zero old count the start names the line to insert after.
    pub fn lines_before(&self) -> usize {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

/// Rewrite the header of `text` so the hunk starts at `old_start`, moving
/// the new side by the same amount. The body is kept as is.
pub fn relocate(text: &str, old_start: usize) -> Result<String, ApplyError> {
    let (first, body) = match text.split_once('\n') {
        Some((first, body)) => (first, Some(body)),
        None => (text, None),
    };
    let header = HunkHeader::parse(first)?;
    let delta = old_start as isize - header.old_start as isize;
    let moved = HunkHeader {
        old_start,
        new_start: (header.new_start as isize + delta).max(0) as usize,
        ..header
    };

    let mut out = moved.to_string();
    if let Some(body) = body {
        out.push('\n');
        out.push_str(body);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// A header plus its body lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHunk {
    pub header: HunkHeader,
    pub lines: Vec<HunkLine>,
}

impl ParsedHunk {
    pub fn parse(text: &str) -> Result<Self, ApplyError> {
        let mut raw = text.lines();
        let header_line = raw
            .next()
            .ok_or_else(|| ApplyError::InvalidDiffHeader(String::new()))?;
        let header = HunkHeader::parse(header_line)?;

        let mut lines = Vec::new();
        for line in raw {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                // Some tools strip the space prefix from blank context lines
                lines.push(HunkLine::Context(String::new()));
                continue;
            }
            let rest = line.get(1..).unwrap_or("");
            match line.as_bytes()[0] {
                b' ' => lines.push(HunkLine::Context(rest.to_string())),
                b'-' => lines.push(HunkLine::Remove(rest.to_string())),
                b'+' => lines.push(HunkLine::Add(rest.to_string())),
                b'\\' => continue,
                _ => return Err(ApplyError::InvalidDiffLine(line.to_string())),
            }
        }

        Ok(Self { header, lines })
    }

    /// Source lines the body consumes (context + removed)
    pub fn old_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Add(_)))
            .count()
    }

    /// Lines the body emits (context + added)
    pub fn new_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Remove(_)))
            .count()
    }
}

/// Build a single unified hunk turning `old` into `new`, keeping up to
/// `context` unchanged lines on each side. Returns None when nothing changed.
pub fn build_hunk(old: &str, new: &str, context: usize) -> Option<String> {
    let (old_lines, _) = split_lines(old);
    let (new_lines, _) = split_lines(new);
    let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

    let first = ops.iter().position(|op| op.tag() != DiffTag::Equal)?;
    let last = ops.iter().rposition(|op| op.tag() != DiffTag::Equal)?;

    // Everything outside [first, last] is equal, so the leading and trailing
    // runs have the same length on both sides
    let change_old_start = ops[first].old_range().start;
    let change_old_end = ops[last].old_range().end;
    let change_new_start = ops[first].new_range().start;
    let change_new_end = ops[last].new_range().end;

    let before = context.min(change_old_start);
    let after = context.min(old_lines.len() - change_old_end);

    let old_from = change_old_start - before;
    let old_to = change_old_end + after;
    let new_from = change_new_start - before;
    let new_to = change_new_end + after;

    let mut body = Vec::new();
    for line in &old_lines[old_from..change_old_start] {
        body.push(format!(" {}", line));
    }
    for op in &ops[first..=last] {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                for line in &old_lines[old_range] {
                    body.push(format!(" {}", line));
                }
            }
            DiffTag::Delete => {
                for line in &old_lines[old_range] {
                    body.push(format!("-{}", line));
                }
            }
            DiffTag::Insert => {
                for line in &new_lines[new_range] {
                    body.push(format!("+{}", line));
                }
            }
            DiffTag::Replace => {
                for line in &old_lines[old_range] {
                    body.push(format!("-{}", line));
                }
                for line in &new_lines[new_range] {
                    body.push(format!("+{}", line));
                }
            }
        }
    }
    for line in &old_lines[change_old_end..old_to] {
        body.push(format!(" {}", line));
    }

    let old_count = old_to - old_from;
    let new_count = new_to - new_from;
    let old_start = if old_count == 0 { old_from } else { old_from + 1 };
    let new_start = if new_count == 0 { new_from } else { new_from + 1 };

    let mut hunk = format!("@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count);
    for line in body {
        hunk.push('\n');
        hunk.push_str(&line);
    }
    Some(hunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_four_field_header() {
        let header = HunkHeader::parse("@@ -2,3 +2,4 @@").unwrap();
        assert_eq!(
            header,
            HunkHeader {
                old_start: 2,
                old_count: 3,
                new_start: 2,
                new_count: 4
            }
        );
    }

    #[test]
    fn test_parse_two_field_header() {
        let header = HunkHeader::parse("@@ -7 +7 @@ fn main()").unwrap();
        assert_eq!(header.old_start, 7);
        assert_eq!(header.old_count, 1);
        assert_eq!(header.new_start, 7);
        assert_eq!(header.new_count, 1);
    }

    #[test]
    fn test_invalid_header() {
        assert!(matches!(
            HunkHeader::parse("@@ garbage @@"),
            Err(ApplyError::InvalidDiffHeader(_))
        ));
        assert!(matches!(
            ParsedHunk::parse(""),
            Err(ApplyError::InvalidDiffHeader(_))
        ));
    }

    #[test]
    fn test_relocate_moves_both_sides() {
        let moved = relocate("@@ -2,2 +2,3 @@ heading\n L2\n+x\n L3", 5).unwrap();
        assert_eq!(moved, "@@ -5,2 +5,3 @@\n L2\n+x\n L3");
        assert_eq!(relocate("@@ -4 +4 @@", 2).unwrap(), "@@ -2,1 +2,1 @@");
    }

    #[test]
    fn test_old_range_saturates() {
        let header = HunkHeader {
            old_start: usize::MAX - 1,
            old_count: 10,
            new_start: 1,
            new_count: 1,
        };
        assert_eq!(header.old_range(), (usize::MAX - 1, usize::MAX - 1));
    }

    #[test]
    fn test_parse_body() {
        let hunk = ParsedHunk::parse("@@ -2,2 +2,2 @@\n L2\n-L3\n+L3x\n L4").unwrap();
        assert_eq!(
            hunk.lines,
            vec![
                HunkLine::Context("L2".to_string()),
                HunkLine::Remove("L3".to_string()),
                HunkLine::Add("L3x".to_string()),
                HunkLine::Context("L4".to_string()),
            ]
        );
        assert_eq!(hunk.old_line_count(), 3);
        assert_eq!(hunk.new_line_count(), 3);
    }

    #[test]
    fn test_unknown_body_prefix() {
        let err = ParsedHunk::parse("@@ -1 +1 @@\n*oops").unwrap_err();
        assert_eq!(err, ApplyError::InvalidDiffLine("*oops".to_string()));
    }

    #[test]
    fn test_no_newline_marker_ignored() {
        let hunk = ParsedHunk::parse("@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+b").unwrap();
        assert_eq!(hunk.lines.len(), 2);
    }

    #[test]
    fn test_build_hunk_identical() {
        assert_eq!(build_hunk("a\nb", "a\nb", 3), None);
    }

    #[test]
    fn test_build_hunk_single_change() {
        let hunk = build_hunk("L1\nL2\nL3\nL4\nL5", "L1\nL2\nL3x\nL4\nL5", 1).unwrap();
        assert_eq!(hunk, "@@ -2,3 +2,3 @@\n L2\n-L3\n+L3x\n L4");
    }

    #[test]
    fn test_build_hunk_pure_insertion_without_context() {
        let hunk = build_hunk("a\nb", "a\nnew\nb", 0).unwrap();
        assert_eq!(hunk, "@@ -1,0 +2,1 @@\n+new");
        let parsed = ParsedHunk::parse(&hunk).unwrap();
        assert_eq!(parsed.header.lines_before(), 1);
    }
}
