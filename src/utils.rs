use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use tempfile::NamedTempFile;

use crate::enhance::EnhanceConfig;

/// Configuration for an `enhance` run over a directory of notes.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
pub struct EnhanceOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub config: EnhanceConfig,
    pub verbose: bool,
    pub quiet: bool,
}

/// Filename stem for a card comment: `{date}_{slug}_{id}.md`.
/// The slug keeps `a-z0-9-` only, truncated to 60 chars; an empty slug
/// falls back to `card`.
pub fn note_filename(date: &DateTime<Utc>, card_name: &str, comment_id: &str) -> String {
    let raw_slug = slug::slugify(card_name);
    // Slug output is ASCII-only, so byte == char.
    let slug = raw_slug[..raw_slug.len().min(60)].trim_end_matches('-');
    let slug = if slug.is_empty() { "card" } else { slug };
    format!("{}_{}_{}.md", date.format("%Y-%m-%d"), slug, comment_id)
}

/// All `*.md` files directly inside `dir`, sorted for stable processing order.
pub fn collect_notes(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to read directory: {}", dir.display()))?;
    let mut notes: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md") && p.is_file())
        .collect();
    notes.sort();
    Ok(notes)
}

/// Write a note through a temporary file in the destination directory, so an
/// interrupted run never leaves a half-written note.
pub fn write_note(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .wrap_err_with(|| format!("Failed to create temporary file in: {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .wrap_err("Failed to write note")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .wrap_err_with(|| format!("Failed to move note into place: {}", path.display()))?;
    Ok(())
}

/// Source stamps read from an existing note's frontmatter.
pub struct NoteStamp {
    pub source_id: Option<String>,
    pub source_hash: Option<String>,
}

/// Cheaply read the source stamps from an existing note's frontmatter,
/// without parsing the whole document.
pub fn read_note_stamp(path: &Path) -> Option<NoteStamp> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first = lines.next()?.ok()?;
    if first.trim() != "---" {
        return None;
    }

    let mut source_id: Option<String> = None;
    let mut source_hash: Option<String> = None;
    let mut bytes_read = 0usize;

    for line in lines {
        let line = line.ok()?;
        bytes_read += line.len() + 1;
        if bytes_read > 2048 || line.trim() == "---" {
            break;
        }
        if let Some(rest) = line.strip_prefix("source_id:") {
            source_id = Some(rest.trim().trim_matches('\'').trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("source_hash:") {
            source_hash = Some(rest.trim().trim_matches('\'').trim_matches('"').to_string());
        }
    }

    Some(NoteStamp {
        source_id,
        source_hash,
    })
}
