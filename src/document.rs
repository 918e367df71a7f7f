//! Note document model: YAML frontmatter + title heading + named sections.
//!
//! A note looks like this on disk:
//!
//! ```text
//! ---
//! aliases:
//! - Reading Habits
//! tags: []
//! ---
//!
//! # Reading Habits
//!
//! ## SECTION 1: INTRODUCTION/OVERVIEW
//!
//! Comment text from the Trello card.
//! ```
//!
//! Parsing is lossless for untouched parts: frontmatter entries keep their
//! original lines and are only re-rendered (canonically, via serde_yaml) when
//! modified, so `render(parse(text))` reproduces well-formed input
//! byte-for-byte apart from normalized trailing whitespace.

use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Marker line delimiting the frontmatter block.
const FRONT_MATTER_MARKER: &str = "---";
/// Heading prefix that starts a new section.
const SECTION_MARKER: &str = "## ";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed front matter: {0}")]
    MalformedFrontMatter(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("section not found: {0:?}")]
    SectionNotFound(String),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontMatterValue {
    Scalar(String),
    List(Vec<String>),
}

impl From<&str> for FrontMatterValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for FrontMatterValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for FrontMatterValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

#[derive(Debug, Clone)]
struct FrontMatterEntry {
    key: String,
    value: FrontMatterValue,
    /// Original lines, kept verbatim so untouched entries round-trip exactly.
    /// Cleared on modification; the canonical form is emitted instead.
    raw: Option<String>,
}

impl FrontMatterEntry {
    fn render(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => canonical_entry(&self.key, &self.value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub heading: String,
    pub body: String,
    preamble: bool,
}

impl Section {
    /// True for the implicit section holding text between the title heading
    /// and the first `## ` heading. It is keyed by the document title and
    /// rendered without a heading line of its own.
    pub fn is_preamble(&self) -> bool {
        self.preamble
    }
}

/// A parsed note. Section order is document order and is preserved by
/// [`NoteDocument::render`]; headings are unique and act as lookup keys.
#[derive(Debug, Clone)]
pub struct NoteDocument {
    front_matter: Vec<FrontMatterEntry>,
    pub title: String,
    sections: Vec<Section>,
}

impl NoteDocument {
    /// An empty document with no frontmatter and no sections.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            front_matter: Vec::new(),
            title: title.into(),
            sections: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> DocumentResult<Self> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.first().map(|l| l.trim()) != Some(FRONT_MATTER_MARKER) {
            return Err(DocumentError::MalformedDocument(
                "note does not start with a front matter block".to_string(),
            ));
        }
        let close = lines
            .iter()
            .skip(1)
            .position(|l| l.trim() == FRONT_MATTER_MARKER)
            .map(|i| i + 1)
            .ok_or_else(|| {
                DocumentError::MalformedFrontMatter("missing closing marker".to_string())
            })?;

        let front_matter = parse_front_matter(&lines[1..close])?;

        let mut idx = close + 1;
        while idx < lines.len() && lines[idx].trim().is_empty() {
            idx += 1;
        }
        let title = match lines.get(idx).and_then(|l| l.strip_prefix("# ")) {
            Some(rest) if !rest.trim().is_empty() => rest.trim_end().to_string(),
            _ => {
                return Err(DocumentError::MalformedDocument(
                    "missing title heading".to_string(),
                ));
            }
        };
        idx += 1;

        let mut doc = Self {
            front_matter,
            title,
            sections: Vec::new(),
        };

        // Preamble: anything between the title and the first section heading.
        let start = idx;
        while idx < lines.len() && !lines[idx].starts_with(SECTION_MARKER) {
            idx += 1;
        }
        let preamble = normalize_body(&lines[start..idx].join("\n"));
        if !preamble.is_empty() {
            doc.sections.push(Section {
                heading: doc.title.clone(),
                body: preamble,
                preamble: true,
            });
        }

        while idx < lines.len() {
            let heading = lines[idx]
                .strip_prefix(SECTION_MARKER)
                .unwrap_or("")
                .trim_end()
                .to_string();
            if heading.is_empty() {
                return Err(DocumentError::MalformedDocument(
                    "empty section heading".to_string(),
                ));
            }
            idx += 1;
            let start = idx;
            while idx < lines.len() && !lines[idx].starts_with(SECTION_MARKER) {
                idx += 1;
            }
            let body = normalize_body(&lines[start..idx].join("\n"));
            doc.push_section(&heading, &body)?;
        }

        Ok(doc)
    }

    /// Append a section. Headings are lookup keys, so duplicates are rejected.
    pub fn push_section(&mut self, heading: &str, body: &str) -> DocumentResult<()> {
        if self.sections.iter().any(|s| s.heading == heading) {
            return Err(DocumentError::MalformedDocument(format!(
                "duplicate section heading {heading:?}"
            )));
        }
        self.sections.push(Section {
            heading: heading.to_string(),
            body: normalize_body(body),
            preamble: false,
        });
        Ok(())
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Exact, case-sensitive heading lookup.
    pub fn get_section(&self, heading: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading == heading)
    }

    /// Replace one section's body in place. A missing heading is an error
    /// rather than a silent no-op; the caller decides how to treat it.
    pub fn replace_section_body(&mut self, heading: &str, new_body: &str) -> DocumentResult<()> {
        match self.sections.iter_mut().find(|s| s.heading == heading) {
            Some(section) => {
                section.body = normalize_body(new_body);
                Ok(())
            }
            None => Err(DocumentError::SectionNotFound(heading.to_string())),
        }
    }

    pub fn front_matter(&self, key: &str) -> Option<&FrontMatterValue> {
        self.front_matter
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.value)
    }

    pub fn front_matter_keys(&self) -> impl Iterator<Item = &str> {
        self.front_matter.iter().map(|e| e.key.as_str())
    }

    /// Overwrite an existing key in place (order preserved) or append a new
    /// one at the end of the block.
    pub fn set_front_matter(&mut self, key: &str, value: impl Into<FrontMatterValue>) {
        let value = value.into();
        match self.front_matter.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.raw = None;
            }
            None => self.front_matter.push(FrontMatterEntry {
                key: key.to_string(),
                value,
                raw: None,
            }),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(FRONT_MATTER_MARKER);
        out.push('\n');
        for entry in &self.front_matter {
            out.push_str(&entry.render());
        }
        out.push_str(FRONT_MATTER_MARKER);
        out.push('\n');
        out.push_str("\n# ");
        out.push_str(&self.title);
        out.push('\n');
        for section in &self.sections {
            out.push('\n');
            if !section.preamble {
                out.push_str(SECTION_MARKER);
                out.push_str(&section.heading);
                out.push('\n');
                if !section.body.is_empty() {
                    out.push('\n');
                }
            }
            if !section.body.is_empty() {
                out.push_str(&section.body);
                out.push('\n');
            }
        }
        out
    }
}

fn normalize_body(text: &str) -> String {
    text.trim().to_string()
}

fn canonical_entry(key: &str, value: &FrontMatterValue) -> String {
    let yaml_value = match value {
        FrontMatterValue::Scalar(s) => Value::String(s.clone()),
        FrontMatterValue::List(items) => {
            Value::Sequence(items.iter().cloned().map(Value::String).collect())
        }
    };
    let mut mapping = Mapping::new();
    mapping.insert(Value::String(key.to_string()), yaml_value);
    serde_yaml::to_string(&mapping).expect("frontmatter entry serializes")
}

fn parse_front_matter(lines: &[&str]) -> DocumentResult<Vec<FrontMatterEntry>> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for line in lines {
        if line.trim().is_empty() {
            if let Some((_, raw)) = entries.last_mut() {
                raw.push_str(line);
                raw.push('\n');
            }
            continue;
        }
        if line.starts_with(['-', ' ', '\t']) {
            match entries.last_mut() {
                Some((_, raw)) => {
                    raw.push_str(line);
                    raw.push('\n');
                }
                None => {
                    return Err(DocumentError::MalformedFrontMatter(format!(
                        "unexpected line before first key: {line:?}"
                    )));
                }
            }
            continue;
        }
        let Some((key, _)) = line.split_once(':') else {
            return Err(DocumentError::MalformedFrontMatter(format!(
                "expected `key: value`, found {line:?}"
            )));
        };
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(DocumentError::MalformedFrontMatter(format!(
                "empty key in {line:?}"
            )));
        }
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(DocumentError::MalformedFrontMatter(format!(
                "duplicate key {key:?}"
            )));
        }
        entries.push((key, format!("{line}\n")));
    }

    entries
        .into_iter()
        .map(|(key, raw)| {
            let value = decode_entry(&key, &raw)?;
            Ok(FrontMatterEntry {
                key,
                value,
                raw: Some(raw),
            })
        })
        .collect()
}

fn decode_entry(key: &str, raw: &str) -> DocumentResult<FrontMatterValue> {
    let mapping: Mapping = serde_yaml::from_str(raw)
        .map_err(|e| DocumentError::MalformedFrontMatter(format!("key {key:?}: {e}")))?;
    let value = mapping
        .into_iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
        .ok_or_else(|| {
            DocumentError::MalformedFrontMatter(format!("key {key:?} did not decode"))
        })?;
    from_yaml(key, value)
}

fn from_yaml(key: &str, value: Value) -> DocumentResult<FrontMatterValue> {
    let scalar = |v: Value| -> Option<String> {
        match v {
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s),
            _ => None,
        }
    };
    match value {
        Value::Null => Ok(FrontMatterValue::Scalar(String::new())),
        Value::Sequence(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match scalar(item) {
                    Some(s) => list.push(s),
                    None => {
                        return Err(DocumentError::MalformedFrontMatter(format!(
                            "key {key:?}: unsupported list item"
                        )));
                    }
                }
            }
            Ok(FrontMatterValue::List(list))
        }
        other => scalar(other)
            .map(FrontMatterValue::Scalar)
            .ok_or_else(|| {
                DocumentError::MalformedFrontMatter(format!("key {key:?}: unsupported value"))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOTE: &str = "\
---
aliases:
- Reading Habits
tags: []
---

# Reading Habits

## SECTION 1: INTRODUCTION/OVERVIEW

Notes about reading every morning.

## SECTION 2: KEY CONCEPTS/DEFINITIONS

[Definition and explanation]
";

    #[test]
    fn round_trip_is_exact() {
        let doc = NoteDocument::parse(NOTE).unwrap();
        assert_eq!(doc.render(), NOTE);
    }

    #[test]
    fn missing_closing_marker_is_malformed_front_matter() {
        let err = NoteDocument::parse("---\ntags: []\n\n# Title\n").unwrap_err();
        assert!(matches!(err, DocumentError::MalformedFrontMatter(_)), "{err}");
    }

    #[test]
    fn missing_front_matter_is_malformed_document() {
        let err = NoteDocument::parse("# Title\n\nBody\n").unwrap_err();
        assert!(matches!(err, DocumentError::MalformedDocument(_)), "{err}");
    }

    #[test]
    fn missing_title_is_malformed_document() {
        let err = NoteDocument::parse("---\ntags: []\n---\n\nNo heading here.\n").unwrap_err();
        assert!(matches!(err, DocumentError::MalformedDocument(_)), "{err}");
    }

    #[test]
    fn duplicate_heading_is_malformed_document() {
        let text = "---\ntags: []\n---\n\n# T\n\n## A\n\nx\n\n## A\n\ny\n";
        let err = NoteDocument::parse(text).unwrap_err();
        assert!(matches!(err, DocumentError::MalformedDocument(_)), "{err}");
    }

    #[test]
    fn section_lookup_is_case_sensitive() {
        let doc = NoteDocument::parse(NOTE).unwrap();
        assert!(doc.get_section("SECTION 2: KEY CONCEPTS/DEFINITIONS").is_some());
        assert!(doc.get_section("section 2: key concepts/definitions").is_none());
    }

    #[test]
    fn replace_touches_only_the_named_section() {
        let mut doc = NoteDocument::parse(NOTE).unwrap();
        doc.replace_section_body(
            "SECTION 2: KEY CONCEPTS/DEFINITIONS",
            "Spaced repetition: reviewing material at increasing intervals.",
        )
        .unwrap();
        let rendered = doc.render();
        assert!(rendered.contains("Notes about reading every morning."));
        assert!(rendered.contains("Spaced repetition: reviewing material at increasing intervals."));
        assert!(!rendered.contains("[Definition and explanation]"));
        // Frontmatter block is untouched.
        assert!(rendered.starts_with("---\naliases:\n- Reading Habits\ntags: []\n---\n"));
    }

    #[test]
    fn replace_unknown_heading_is_an_error() {
        let mut doc = NoteDocument::parse(NOTE).unwrap();
        let err = doc.replace_section_body("SECTION 9: MISSING", "x").unwrap_err();
        assert!(matches!(err, DocumentError::SectionNotFound(_)), "{err}");
    }

    #[test]
    fn set_front_matter_preserves_order_and_appends_new_keys() {
        let mut doc = NoteDocument::parse(NOTE).unwrap();
        doc.set_front_matter("tags", vec!["reading".to_string(), "memory".to_string()]);
        doc.set_front_matter("created", "2023-05-01T12:34:56.000Z");
        let keys: Vec<&str> = doc.front_matter_keys().collect();
        assert_eq!(keys, vec!["aliases", "tags", "created"]);

        let rendered = doc.render();
        assert!(rendered.contains("tags:\n- reading\n- memory\n"));
        // Untouched entries keep their original lines.
        assert!(rendered.contains("aliases:\n- Reading Habits\n"));
    }

    #[test]
    fn preamble_is_keyed_by_the_title() {
        let text = "---\ntags: []\n---\n\n# My Note\n\nA loose paragraph.\n\n## A\n\nx\n";
        let doc = NoteDocument::parse(text).unwrap();
        let preamble = doc.get_section("My Note").unwrap();
        assert!(preamble.is_preamble());
        assert_eq!(preamble.body, "A loose paragraph.");
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn inline_lists_and_quoted_scalars_decode() {
        let text = "---\ntags: [alpha, beta]\ntitle: 'a: b'\n---\n\n# T\n\n## A\n\nx\n";
        let doc = NoteDocument::parse(text).unwrap();
        assert_eq!(
            doc.front_matter("tags"),
            Some(&FrontMatterValue::List(vec![
                "alpha".to_string(),
                "beta".to_string()
            ]))
        );
        assert_eq!(
            doc.front_matter("title"),
            Some(&FrontMatterValue::Scalar("a: b".to_string()))
        );
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn built_documents_parse_back() {
        let mut doc = NoteDocument::new("Fresh Note");
        doc.set_front_matter("aliases", vec!["Fresh Note".to_string()]);
        doc.set_front_matter("tags", Vec::<String>::new());
        doc.push_section("SECTION 1: INTRODUCTION/OVERVIEW", "Hello.").unwrap();
        doc.push_section("SECTION 2: KEY CONCEPTS/DEFINITIONS", "[Definition and explanation]")
            .unwrap();
        let rendered = doc.render();
        let reparsed = NoteDocument::parse(&rendered).unwrap();
        assert_eq!(reparsed.render(), rendered);
        assert_eq!(reparsed.title, "Fresh Note");
        assert_eq!(reparsed.sections().len(), 2);
    }
}
