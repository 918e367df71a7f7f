//! Board export → note files.
//!
//! One Markdown note per card comment. The comment text becomes the
//! introduction section; the remaining template sections hold bracketed
//! instructions for the `enhance` step to fill in later.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use eyre::{Context, Result};
use sha2::{Digest, Sha256};

use crate::document::{DocumentResult, NoteDocument};
use crate::enhance::SECTION_INTRO;
use crate::importer::{BoardExport, Comment};
use crate::utils;

/// Template sections appended after the introduction, with their
/// placeholder bodies.
pub const TEMPLATE_SECTIONS: [(&str, &str); 4] = [
    (
        "SECTION 2: KEY CONCEPTS/DEFINITIONS",
        "[Definition and explanation of the key concepts]",
    ),
    (
        "SECTION 3: EVIDENCE/SUPPORTING DETAILS",
        "[Evidence, examples, or details that support the main idea]",
    ),
    (
        "SECTION 4: IMPLICATIONS & CONNECTIONS",
        "[How this connects to other notes, and what it implies]",
    ),
    (
        "SECTION 5: SOURCE(S) & FURTHER READING",
        "[Links to the source material and further reading]",
    ),
];

/// Configuration for a `convert` run.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
pub struct ConvertOptions {
    pub output_dir: PathBuf,
    pub tags: Option<Vec<String>>,
    pub force: bool,
    pub verbose: bool,
    pub quiet: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

/// Read the board export and write one note per comment.
pub fn execute(json_path: &Path, options: &ConvertOptions) -> Result<ConvertSummary> {
    let raw = fs::read_to_string(json_path)
        .wrap_err_with(|| format!("Failed to read board export: {}", json_path.display()))?;
    let board: BoardExport = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Failed to parse board export: {}", json_path.display()))?;

    fs::create_dir_all(&options.output_dir).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            options.output_dir.display()
        )
    })?;

    let mut summary = ConvertSummary::default();

    for comment in board.comments() {
        match convert_comment(&comment, options) {
            Ok(ProcessResult::Created) => summary.created += 1,
            Ok(ProcessResult::Updated) => summary.updated += 1,
            Ok(ProcessResult::Skipped) => summary.skipped += 1,
            Err(e) => {
                summary.errors += 1;
                eprintln!(
                    "Error [{}]: {:#}",
                    &comment.id[..8.min(comment.id.len())],
                    e
                );
            }
        }
    }

    if !options.quiet {
        let mut line = format!(
            "Done. {} created, {} updated, {} skipped.",
            summary.created, summary.updated, summary.skipped
        );
        if summary.errors > 0 {
            let _ = write!(line, " Completed with {} error(s).", summary.errors);
        }
        eprintln!("{line}");
    }

    Ok(summary)
}

fn convert_comment(comment: &Comment, options: &ConvertOptions) -> Result<ProcessResult> {
    let filename = utils::note_filename(&comment.date, comment.card_name, comment.id);
    let path = options.output_dir.join(&filename);
    let hash = content_hash(comment.text);

    let exists = path.exists();

    // Idempotency check: the frontmatter stamp identifies the source comment
    // revision this note was generated from.
    if !options.force
        && exists
        && let Some(stamp) = utils::read_note_stamp(&path)
        && stamp.source_hash.as_deref() == Some(hash.as_str())
    {
        if options.verbose {
            eprintln!("Skipped:  {filename}");
        }
        return Ok(ProcessResult::Skipped);
    }

    let doc = build_note(comment, options.tags.as_deref(), &hash)
        .wrap_err_with(|| format!("Failed to build note for comment {}", comment.id))?;
    utils::write_note(&path, &doc.render())?;

    let result = if exists {
        ProcessResult::Updated
    } else {
        ProcessResult::Created
    };
    if options.verbose {
        match result {
            ProcessResult::Created => eprintln!("Created:  {filename}"),
            ProcessResult::Updated => eprintln!("Updated:  {filename}"),
            ProcessResult::Skipped => unreachable!(),
        }
    }
    Ok(result)
}

fn build_note(
    comment: &Comment,
    tags: Option<&[String]>,
    hash: &str,
) -> DocumentResult<NoteDocument> {
    let mut doc = NoteDocument::new(comment.card_name);
    doc.set_front_matter("aliases", vec![comment.card_name.to_string()]);
    doc.set_front_matter("tags", tags.map(<[String]>::to_vec).unwrap_or_default());
    doc.set_front_matter(
        "created",
        comment.date.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    doc.set_front_matter("source_id", comment.id);
    doc.set_front_matter("source_hash", hash);
    doc.push_section(SECTION_INTRO, comment.text)?;
    for (heading, placeholder) in TEMPLATE_SECTIONS {
        doc.push_section(heading, placeholder)?;
    }
    Ok(doc)
}

/// First 8 bytes of the comment's sha256, hex-encoded.
fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hash = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hash, "{byte:02x}");
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FrontMatterValue;
    use crate::enhance::is_placeholder;

    const EXPORT: &str = r#"{
        "name": "Test Board",
        "actions": [
            {
                "id": "64a1b2c3d4e5f60708091011",
                "type": "commentCard",
                "date": "2023-05-01T12:34:56.000Z",
                "data": {
                    "card": { "name": "Reading Habits" },
                    "text": "Read every morning before checking any screens."
                }
            },
            {
                "id": "64a1b2c3d4e5f60708091012",
                "type": "updateCard",
                "date": "2023-05-02T08:00:00.000Z",
                "data": {}
            }
        ]
    }"#;

    fn options(dir: &Path) -> ConvertOptions {
        ConvertOptions {
            output_dir: dir.to_path_buf(),
            tags: Some(vec!["trello".to_string()]),
            force: false,
            verbose: false,
            quiet: true,
        }
    }

    fn write_export(dir: &Path) -> PathBuf {
        let path = dir.join("board.json");
        fs::write(&path, EXPORT).unwrap();
        path
    }

    #[test]
    fn converts_comments_into_parseable_notes() {
        let dir = tempfile::tempdir().unwrap();
        let json = write_export(dir.path());
        let out = dir.path().join("notes");

        let summary = execute(&json, &options(&out)).unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.errors, 0);

        let note_path = out.join("2023-05-01_reading-habits_64a1b2c3d4e5f60708091011.md");
        let text = fs::read_to_string(&note_path).unwrap();
        let doc = NoteDocument::parse(&text).unwrap();

        assert_eq!(doc.title, "Reading Habits");
        assert_eq!(
            doc.front_matter("tags"),
            Some(&FrontMatterValue::List(vec!["trello".to_string()]))
        );
        assert_eq!(
            doc.get_section(SECTION_INTRO).unwrap().body,
            "Read every morning before checking any screens."
        );
        for (heading, _) in TEMPLATE_SECTIONS {
            assert!(is_placeholder(&doc.get_section(heading).unwrap().body));
        }
        // The note round-trips through the document model.
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn unchanged_comments_are_skipped_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let json = write_export(dir.path());
        let out = dir.path().join("notes");

        execute(&json, &options(&out)).unwrap();
        let second = execute(&json, &options(&out)).unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.created + second.updated, 0);
    }

    #[test]
    fn force_rewrites_existing_notes() {
        let dir = tempfile::tempdir().unwrap();
        let json = write_export(dir.path());
        let out = dir.path().join("notes");

        execute(&json, &options(&out)).unwrap();
        let mut opts = options(&out);
        opts.force = true;
        let second = execute(&json, &opts).unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(second.skipped, 0);
    }
}
