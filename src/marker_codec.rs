// src/marker_codec.rs
//! Inline comment markers.
//!
//! A marker embeds a comment in document text:
//!
//! ```text
//! {>>[@author:id:threadId:line:timestamp:type] comment body <<}
//! ```
//!
//! Older documents carry shorter payloads. The format is recognised by the
//! number of colons in the payload, after removing an optional trailing
//! `:true`/`:false` resolved flag. Timestamps contain colons of their own,
//! so the fixed leading fields are split from the left and the rest is
//! taken apart from the right.

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DocumentParseError, MetadataError};
use crate::ids::IdGenerator;
use crate::models::{now, sanitize_author, sanitize_id, Comment, CommentType, UNKNOWN_AUTHOR};
use crate::text::{join_lines, split_lines};
use crate::threads::{build_threads, get_all_comments};

pub const MARKER_OPEN: &str = "{>>";
pub const MARKER_CLOSE: &str = "<<}";

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{>>(?:\[@([^\]]*)\])?(.*?)<<\}").expect("invalid comment marker regex")
});

/// Known payload layouts, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFormat {
    /// `author:id:timestamp`
    Anonymous,
    /// `author:id:line:timestamp`
    Legacy,
    /// `author:id:threadId:line:timestamp`
    Threaded,
    /// `author:id:threadId:line:timestamp:type`
    Current,
}

impl MarkerFormat {
    /// Recognise a payload by its colon count (two belong to the timestamp)
    pub fn from_colons(colons: usize) -> Option<Self> {
        match colons {
            4 => Some(MarkerFormat::Anonymous),
            5 => Some(MarkerFormat::Legacy),
            6 => Some(MarkerFormat::Threaded),
            7 => Some(MarkerFormat::Current),
            _ => None,
        }
    }

    /// Fields split off the left before the timestamp-bearing remainder
    fn leading_fields(&self) -> usize {
        match self {
            MarkerFormat::Anonymous | MarkerFormat::Legacy => 2,
            MarkerFormat::Threaded | MarkerFormat::Current => 3,
        }
    }

    fn has_line(&self) -> bool {
        !matches!(self, MarkerFormat::Anonymous)
    }

    fn has_type(&self) -> bool {
        matches!(self, MarkerFormat::Current)
    }
}

/// Everything a marker payload carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMetadata {
    /// None for a marker without metadata
    pub format: Option<MarkerFormat>,
    pub author: String,
    pub id: String,
    pub thread_id: String,
    /// Line recorded when the marker was written. Advisory only.
    pub encoded_line: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub comment_type: Option<CommentType>,
    pub resolved: bool,
}

/// Encode a comment's metadata in the current format. Author and ids are
/// sanitized on the way out as well, deserialized comments included.
pub fn encode_metadata(comment: &Comment) -> String {
    let mut payload = format!(
        "{}:{}:{}:{}:{}:{}",
        sanitize_author(&comment.author),
        sanitize_id(&comment.id),
        sanitize_id(&comment.thread_id),
        comment.line,
        comment.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        comment.comment_type.map(|t| t.as_str()).unwrap_or(""),
    );
    if comment.resolved {
        payload.push_str(":true");
    }
    payload
}

/// Full marker for one comment. Bodies are single-line.
pub fn encode_marker(comment: &Comment) -> String {
    let body = collapse_whitespace(&comment.text).replace(MARKER_CLOSE, "<< }");
    format!("{}[@{}] {} {}", MARKER_OPEN, encode_metadata(comment), body, MARKER_CLOSE)
}

/// Decode a payload found on physical line `line` (1-indexed).
///
/// An empty payload is a marker without metadata and gets a fresh identity.
pub fn decode_metadata(
    payload: &str,
    line: usize,
    ids: &dyn IdGenerator,
) -> Result<MarkerMetadata, MetadataError> {
    let payload = payload.trim();
    if !payload.contains(':') {
        let id = ids.next_id();
        return Ok(MarkerMetadata {
            format: None,
            author: UNKNOWN_AUTHOR.to_string(),
            thread_id: id.clone(),
            id,
            encoded_line: None,
            created_at: now(),
            comment_type: None,
            resolved: false,
        });
    }

    let (payload, resolved) = strip_resolved_flag(payload);
    let colons = payload.matches(':').count();
    let format = MarkerFormat::from_colons(colons)
        .ok_or(MetadataError::UnknownMetadataFormat { line, colons })?;

    let mut fields = payload.splitn(format.leading_fields() + 1, ':');
    let author = fields.next().unwrap_or_default();
    let id = fields.next().unwrap_or_default();
    let thread_id = if format.leading_fields() == 3 {
        fields.next().unwrap_or_default()
    } else {
        id
    };
    let mut remainder = fields.next().unwrap_or_default();

    let mut comment_type = None;
    if format.has_type() {
        if let Some((rest, raw_type)) = remainder.rsplit_once(':') {
            remainder = rest;
            comment_type = parse_type(raw_type);
        }
    }

    let mut encoded_line = None;
    if format.has_line() {
        if let Some((raw_line, rest)) = remainder.split_once(':') {
            remainder = rest;
            encoded_line = raw_line.trim().parse().ok();
        }
    }

    let created_at = DateTime::parse_from_rfc3339(remainder.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MetadataError::InvalidTimestamp {
            line,
            value: remainder.to_string(),
        })?;

    let thread_id = if thread_id.is_empty() { id } else { thread_id };
    let author = if author.is_empty() { UNKNOWN_AUTHOR } else { author };

    Ok(MarkerMetadata {
        format: Some(format),
        author: author.to_string(),
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        encoded_line,
        created_at,
        comment_type,
        resolved,
    })
}

/// Decode a payload into a comment anchored at the physical `line`
pub fn decode(payload: &str, line: usize, ids: &dyn IdGenerator) -> Result<Comment, MetadataError> {
    let meta = decode_metadata(payload, line, ids)?;
    if let Some(encoded) = meta.encoded_line {
        if encoded != line {
            debug!("Marker {} recorded line {}, found on line {}", meta.id, encoded, line);
        }
    }
    let mut comment = Comment::from_identity(meta.id, meta.thread_id, &meta.author, meta.created_at, "", line);
    comment.comment_type = meta.comment_type;
    comment.resolved = meta.resolved;
    Ok(comment)
}

fn strip_resolved_flag(payload: &str) -> (&str, bool) {
    if let Some(rest) = payload.strip_suffix(":true") {
        (rest, true)
    } else if let Some(rest) = payload.strip_suffix(":false") {
        (rest, false)
    } else {
        (payload, false)
    }
}

fn parse_type(raw: &str) -> Option<CommentType> {
    if raw.trim().is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(t) => Some(t),
        Err(e) => {
            debug!("Ignoring marker type: {}", e);
            None
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace runs after the leading indentation and drop
/// trailing whitespace
fn tidy_line(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let body = collapse_whitespace(body);
    if body.is_empty() {
        String::new()
    } else {
        format!("{}{}", indent, body)
    }
}

/// Document text with markers removed, plus the comments they carried
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub content: String,
    pub threads: Vec<Comment>,
}

/// Strip every marker from `text` and group the comments into threads.
///
/// Parsing is atomic: if any marker is malformed no document is returned,
/// and the error lists every malformed marker.
pub fn parse_document(text: &str, ids: &dyn IdGenerator) -> Result<ParsedDocument, DocumentParseError> {
    let (lines, trailing_newline) = split_lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut comments = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if !line.contains(MARKER_OPEN) {
            out.push(line.to_string());
            continue;
        }

        let mut found = false;
        for caps in MARKER_RE.captures_iter(line) {
            found = true;
            let payload = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            match decode(payload, line_no, ids) {
                Ok(mut comment) => {
                    comment.text = collapse_whitespace(body);
                    comments.push(comment);
                }
                Err(e) => errors.push(e),
            }
        }

        if found {
            out.push(tidy_line(&MARKER_RE.replace_all(line, "")));
        } else {
            out.push(line.to_string());
        }
    }

    if !errors.is_empty() {
        return Err(DocumentParseError { errors });
    }

    debug!("Parsed {} comment marker(s)", comments.len());
    Ok(ParsedDocument {
        content: join_lines(&out, trailing_newline),
        threads: build_threads(comments),
    })
}

/// Embed every comment as a marker at the end of its anchor line.
/// Anchors past the end land on the last line.
pub fn serialize_document(content: &str, threads: &[Comment]) -> String {
    let (lines, trailing_newline) = split_lines(content);
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    if out.is_empty() {
        out.push(String::new());
    }

    let last = out.len();
    for comment in get_all_comments(threads) {
        let idx = comment.line.clamp(1, last) - 1;
        let line = &mut out[idx];
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&encode_marker(comment));
    }

    join_lines(&out, trailing_newline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use chrono::TimeZone;

    #[test]
    fn test_decode_legacy_format() {
        let ids = SequentialIdGenerator::default();
        let comment = decode("alice:c1:3:2025-01-15T10:30:00Z", 9, &ids).unwrap();
        assert_eq!(comment.author, "alice");
        assert_eq!(comment.id, "c1");
        assert_eq!(comment.thread_id, "c1");
        assert_eq!(comment.comment_type, None);
        assert_eq!(comment.line, 9);
        assert!(comment.replies.is_empty());
        assert_eq!(
            comment.created_at,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_decode_every_format() {
        let ids = SequentialIdGenerator::default();
        let cases = [
            ("alice:c1:2025-01-15T10:30:00Z", MarkerFormat::Anonymous, "c1", None),
            ("alice:c1:3:2025-01-15T10:30:00Z", MarkerFormat::Legacy, "c1", Some(3)),
            ("alice:c2:c1:3:2025-01-15T10:30:00Z", MarkerFormat::Threaded, "c1", Some(3)),
            ("alice:c2:c1:3:2025-01-15T10:30:00Z:Blocker", MarkerFormat::Current, "c1", Some(3)),
        ];
        for (payload, format, thread, line) in cases {
            let meta = decode_metadata(payload, 1, &ids).unwrap();
            assert_eq!(meta.format, Some(format), "{}", payload);
            assert_eq!(meta.thread_id, thread, "{}", payload);
            assert_eq!(meta.encoded_line, line, "{}", payload);
        }
    }

    #[test]
    fn test_decode_current_type_and_resolved_flag() {
        let ids = SequentialIdGenerator::default();
        let meta = decode_metadata("bob:c5:c4:12:2025-02-01T08:00:00Z:Question:true", 1, &ids).unwrap();
        assert_eq!(meta.comment_type, Some(CommentType::Question));
        assert!(meta.resolved);

        let meta = decode_metadata("bob:c5:c4:12:2025-02-01T08:00:00Z::false", 1, &ids).unwrap();
        assert_eq!(meta.format, Some(MarkerFormat::Current));
        assert_eq!(meta.comment_type, None);
        assert!(!meta.resolved);
    }

    #[test]
    fn test_decode_without_metadata() {
        let ids = SequentialIdGenerator::new("gen");
        let comment = decode("", 4, &ids).unwrap();
        assert_eq!(comment.author, UNKNOWN_AUTHOR);
        assert_eq!(comment.id, "gen1");
        assert_eq!(comment.thread_id, "gen1");
        assert_eq!(comment.line, 4);
    }

    #[test]
    fn test_decode_errors_carry_line() {
        let ids = SequentialIdGenerator::default();
        assert_eq!(
            decode("a:b:c", 6, &ids).unwrap_err(),
            MetadataError::UnknownMetadataFormat { line: 6, colons: 2 }
        );
        assert!(matches!(
            decode("alice:c1:3:yesterday:noon:now", 2, &ids),
            Err(MetadataError::InvalidTimestamp { line: 2, .. })
        ));
    }

    #[test]
    fn test_encode_current_format() {
        let ids = SequentialIdGenerator::default();
        let mut comment = Comment::new(&ids, "alice", "Needs\n  a source", 3).with_type(CommentType::Technical);
        comment.created_at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            encode_metadata(&comment),
            "alice:c1:c1:3:2025-01-15T10:30:00Z:Technical"
        );
        assert_eq!(
            encode_marker(&comment),
            "{>>[@alice:c1:c1:3:2025-01-15T10:30:00Z:Technical] Needs a source <<}"
        );
    }

    #[test]
    fn test_encode_decode_identity() {
        let ids = SequentialIdGenerator::default();
        let mut comment = Comment::new(&ids, "alice", "text", 8).with_type(CommentType::Editorial);
        comment.resolved = true;
        let decoded = decode(&encode_metadata(&comment), 8, &ids).unwrap();
        assert_eq!(decoded.id, comment.id);
        assert_eq!(decoded.thread_id, comment.thread_id);
        assert_eq!(decoded.author, comment.author);
        assert_eq!(decoded.created_at, comment.created_at);
        assert_eq!(decoded.comment_type, comment.comment_type);
        assert!(decoded.resolved);
    }

    #[test]
    fn test_structural_characters_never_reach_the_payload() {
        let ids = SequentialIdGenerator::default();
        let mut comment = Comment::new(&ids, "alice", "hi", 1);
        // As if loaded from a hand-edited sidecar
        comment.author = "bob:admin".to_string();
        comment.id = "c:[9]".to_string();
        comment.thread_id = comment.id.clone();

        let parsed = parse_document(&serialize_document("text\n", &[comment]), &ids).unwrap();
        assert_eq!(parsed.content, "text\n");
        assert_eq!(parsed.threads[0].author, "bob-admin");
        assert_eq!(parsed.threads[0].id, "c--9-");
        assert_eq!(parsed.threads[0].thread_id, "c--9-");
    }

    #[test]
    fn test_parse_document_strips_markers() {
        let ids = SequentialIdGenerator::default();
        let text = "# Title\n  Some   text {>>[@alice:c1:c1:2:2025-01-15T10:30:00Z:] Check  this <<} here.\nEnd\n";
        let parsed = parse_document(text, &ids).unwrap();
        assert_eq!(parsed.content, "# Title\n  Some text here.\nEnd\n");
        assert_eq!(parsed.threads.len(), 1);
        assert_eq!(parsed.threads[0].text, "Check this");
        assert_eq!(parsed.threads[0].line, 2);
    }

    #[test]
    fn test_parse_document_groups_replies() {
        let ids = SequentialIdGenerator::default();
        let text = "one {>>[@alice:c1:c1:1:2025-01-15T10:30:00Z:Question] Why? <<}{>>[@bob:c2:c1:1:2025-01-15T10:31:00Z:] Because <<}\ntwo";
        let parsed = parse_document(text, &ids).unwrap();
        assert_eq!(parsed.content, "one\ntwo");
        assert_eq!(parsed.threads.len(), 1);
        assert_eq!(parsed.threads[0].replies[0].author, "bob");
    }

    #[test]
    fn test_parse_document_is_atomic() {
        let ids = SequentialIdGenerator::default();
        let text = "ok {>>[@alice:c1:2025-01-15T10:30:00Z] fine <<}\nbad {>>[@x:y] oops <<}\nworse {>>[@a:b:c:d:e:f:g:h:i] no <<}";
        let err = parse_document(text, &ids).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[0].line(), 2);
        assert_eq!(err.errors[1].line(), 3);
    }

    #[test]
    fn test_serialize_then_parse_round_trip() {
        let ids = SequentialIdGenerator::default();
        let mut root = Comment::new(&ids, "alice", "first", 2);
        root.reply(&ids, "bob", "second");
        let far = Comment::new(&ids, "carol", "past the end", 40);
        let threads = vec![root, far];

        let marked = serialize_document("a\nb\nc\n", &threads);
        let parsed = parse_document(&marked, &ids).unwrap();
        assert_eq!(parsed.content, "a\nb\nc\n");
        assert_eq!(get_all_comments(&parsed.threads).len(), 3);
        assert_eq!(parsed.threads[1].line, 3);

        let again = parse_document(&serialize_document(&parsed.content, &parsed.threads), &ids).unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_serialize_empty_document() {
        let ids = SequentialIdGenerator::default();
        let comment = Comment::new(&ids, "alice", "hello", 1);
        let marked = serialize_document("", &[comment]);
        assert!(marked.starts_with(MARKER_OPEN));
        assert_eq!(parse_document(&marked, &ids).unwrap().content, "");
    }
}
