// src/outline.rs
//! Document outline used to resolve section anchors.
//!
//! Validation only depends on the `Outline` trait. `MarkdownOutline` is the
//! default implementation, built from headings with pulldown-cmark.

use std::collections::HashMap;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::text::line_count;

/// Separator between titles in a rendered section path
pub const PATH_SEPARATOR: &str = " > ";

/// A heading and the lines it governs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub level: u8,
    /// Line of the heading itself, 1-indexed
    pub start_line: usize,
    /// Last line before the next heading of the same or higher level
    pub end_line: usize,
    pub parent_id: Option<String>,
}

pub trait Outline {
    /// Sections in document order
    fn sections(&self) -> &[Section];

    fn section_by_id(&self, id: &str) -> Option<&Section> {
        self.sections().iter().find(|s| s.id == id)
    }

    /// Full path from the outermost heading, e.g. `Guide > Install > Linux`
    fn section_path(&self, section: &Section) -> String {
        let mut titles = vec![section.title.as_str()];
        let mut parent = section.parent_id.as_deref();
        while let Some(id) = parent {
            match self.section_by_id(id) {
                Some(p) => {
                    titles.push(p.title.as_str());
                    parent = p.parent_id.as_deref();
                }
                None => break,
            }
        }
        titles.reverse();
        titles.join(PATH_SEPARATOR)
    }

    /// Resolve a rendered path. Whitespace around separators is ignored.
    fn find_section(&self, path: &str) -> Option<&Section> {
        let wanted = normalize_path(path);
        self.sections()
            .iter()
            .find(|s| normalize_path(&self.section_path(s)) == wanted)
    }

    /// Innermost section containing `line`
    fn section_at_line(&self, line: usize) -> Option<&Section> {
        self.sections()
            .iter()
            .filter(|s| s.start_line <= line && line <= s.end_line)
            .max_by_key(|s| (s.start_line, s.level))
    }
}

fn normalize_path(path: &str) -> Vec<String> {
    path.split('>')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Outline extracted from markdown headings (ATX and setext)
#[derive(Debug, Clone, Default)]
pub struct MarkdownOutline {
    sections: Vec<Section>,
}

impl MarkdownOutline {
    pub fn extract(content: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        let mut current: Option<(u8, usize, String)> = None;
        let mut slugs: HashMap<String, usize> = HashMap::new();
        let mut stack: Vec<(u8, String)> = Vec::new();

        for (event, range) in Parser::new(content).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    let line = content[..range.start].matches('\n').count() + 1;
                    current = Some((level as u8, line, String::new()));
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some((_, _, ref mut title)) = current {
                        title.push_str(&text);
                    }
                }
                Event::End(TagEnd::Heading(_)) => {
                    let Some((level, line, title)) = current.take() else {
                        continue;
                    };
                    let title = title.trim().to_string();

                    while stack.last().is_some_and(|(l, _)| *l >= level) {
                        stack.pop();
                    }
                    let id = unique_slug(&title, &mut slugs);
                    sections.push(Section {
                        id: id.clone(),
                        title,
                        level,
                        start_line: line,
                        end_line: line,
                        parent_id: stack.last().map(|(_, id)| id.clone()),
                    });
                    stack.push((level, id));
                }
                _ => {}
            }
        }

        // A section runs until the next heading at the same or higher level
        let total = line_count(content).max(1);
        for i in 0..sections.len() {
            let level = sections[i].level;
            let next = sections[i + 1..]
                .iter()
                .find(|s| s.level <= level)
                .map(|s| s.start_line - 1);
            sections[i].end_line = next.unwrap_or(total).max(sections[i].start_line);
        }

        Self { sections }
    }
}

impl Outline for MarkdownOutline {
    fn sections(&self) -> &[Section] {
        &self.sections
    }
}

fn unique_slug(title: &str, seen: &mut HashMap<String, usize>) -> String {
    let mut slug = String::new();
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        slug = "section".to_string();
    }

    let count = seen.entry(slug.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        slug
    } else {
        format!("{}-{}", slug, *count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Guide\nintro\n## Install\nsteps\n### Linux\napt\n## Usage\nrun\n# Appendix\nnotes\n";

    #[test]
    fn test_extract_sections() {
        let outline = MarkdownOutline::extract(DOC);
        let ids: Vec<&str> = outline.sections().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["guide", "install", "linux", "usage", "appendix"]);

        let install = &outline.sections()[1];
        assert_eq!(install.start_line, 3);
        assert_eq!(install.end_line, 6);
        assert_eq!(install.parent_id.as_deref(), Some("guide"));

        let guide = &outline.sections()[0];
        assert_eq!(guide.end_line, 8);
        assert_eq!(outline.sections()[4].end_line, 10);
    }

    #[test]
    fn test_section_path_and_lookup() {
        let outline = MarkdownOutline::extract(DOC);
        let linux = &outline.sections()[2];
        assert_eq!(outline.section_path(linux), "Guide > Install > Linux");
        assert_eq!(
            outline.find_section("Guide>Install >  Linux").map(|s| s.id.as_str()),
            Some("linux")
        );
        assert!(outline.find_section("Guide > Linux").is_none());
    }

    #[test]
    fn test_section_at_line_is_innermost() {
        let outline = MarkdownOutline::extract(DOC);
        assert_eq!(outline.section_at_line(6).map(|s| s.id.as_str()), Some("linux"));
        assert_eq!(outline.section_at_line(4).map(|s| s.id.as_str()), Some("install"));
        assert_eq!(outline.section_at_line(2).map(|s| s.id.as_str()), Some("guide"));
    }

    #[test]
    fn test_setext_and_duplicate_titles() {
        let outline = MarkdownOutline::extract("Notes\n=====\n\n## Notes\ntext\n");
        let sections = outline.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].level, 1);
        assert_eq!(sections[0].start_line, 1);
        assert_eq!(sections[1].id, "notes-1");
        assert_eq!(sections[1].start_line, 4);
    }

    #[test]
    fn test_no_headings() {
        let outline = MarkdownOutline::extract("just text\n");
        assert!(outline.sections().is_empty());
        assert!(outline.section_at_line(1).is_none());
    }
}
