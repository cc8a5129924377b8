//! Level-two markdown sections of stage outputs.
//!
//! Stage outputs are split on `## ` headings. Deeper headings stay inside the
//! enclosing section, and headings inside fenced code blocks are ignored.

use serde::{Deserialize, Serialize};

/// One `## ` section of a stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text without the leading hashes. Empty for a preamble.
    pub title: String,
    /// Everything below the heading, trimmed.
    pub body: String,
}

impl Section {
    /// Creates a section.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Returns true if the lowercased title contains any of the keywords.
    #[must_use]
    pub fn matches(&self, keywords: &[&str]) -> bool {
        let title = self.title.to_lowercase();
        keywords.iter().any(|k| title.contains(&k.to_lowercase()))
    }

    /// Returns true if the body has no visible content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Renders the section back to markdown at the given heading level.
    #[must_use]
    pub fn render(&self, level: usize) -> String {
        if self.title.is_empty() {
            return self.body.clone();
        }
        format!("{} {}\n\n{}", "#".repeat(level), self.title, self.body)
    }
}

fn heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("## ")?;
    Some(rest.trim().trim_end_matches('#').trim())
}

/// Splits markdown into its level-two sections.
///
/// Text before the first heading becomes an untitled preamble section when it
/// is not blank.
#[must_use]
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = String::new();
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let flush = |title: &str, body: &[&str], sections: &mut Vec<Section>| {
        let text = body.join("\n").trim().to_string();
        if !title.is_empty() || !text.is_empty() {
            sections.push(Section::new(title, text));
        }
    };

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        match heading(line) {
            Some(h) if !in_fence => {
                flush(&title, &body, &mut sections);
                title = h.to_string();
                body.clear();
            }
            _ => body.push(line),
        }
    }
    flush(&title, &body, &mut sections);

    sections
}

/// Finds the first section whose title matches any keyword.
#[must_use]
pub fn find_section<'a>(sections: &'a [Section], keywords: &[&str]) -> Option<&'a Section> {
    sections.iter().find(|s| s.matches(keywords))
}
