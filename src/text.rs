// src/text.rs
// Line splitting shared by the applier, tracker and codec.
// A single trailing '\n' terminates the last line rather than starting a new one.

/// Split content into lines, reporting whether it ended with a newline
pub fn split_lines(content: &str) -> (Vec<&str>, bool) {
    if content.is_empty() {
        return (Vec::new(), false);
    }
    match content.strip_suffix('\n') {
        Some(body) => (body.split('\n').collect(), true),
        None => (content.split('\n').collect(), false),
    }
}

/// Inverse of `split_lines`
pub fn join_lines<S: AsRef<str>>(lines: &[S], trailing_newline: bool) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

pub fn line_count(content: &str) -> usize {
    split_lines(content).0.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        let (lines, trailing) = split_lines("a\nb\nc");
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert!(!trailing);
    }

    #[test]
    fn test_split_trailing_newline() {
        let (lines, trailing) = split_lines("a\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(trailing);
        assert_eq!(join_lines(&lines, trailing), "a\nb\n");
    }

    #[test]
    fn test_empty_content_has_no_lines() {
        assert_eq!(line_count(""), 0);
        assert_eq!(line_count("\n"), 1);
        assert_eq!(join_lines::<&str>(&[], true), "");
    }
}
