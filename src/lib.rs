//! # trello-note-export
//!
//! A CLI tool that turns a [Trello](https://trello.com) board export into standalone
//! Markdown study notes, and fills the notes' templated sections using a locally
//! hosted LLM.
//!
//! ## What it does
//!
//! Trello's "export board" feature produces a single JSON file containing, among
//! other things, every comment ever left on a card. `convert` creates one Markdown
//! note per comment, with YAML frontmatter (aliases, tags, source stamps) and a
//! fixed five-section study-note layout. The comment text lands in the
//! introduction section; the remaining sections carry bracketed template
//! instructions.
//!
//! `enhance` takes such notes and asks an OpenAI-compatible chat-completion
//! endpoint (LM Studio by default) to write the sections that still hold template
//! instructions. Sections you have already written are left untouched, as is the
//! rest of the document. After a successful pass the note's `tags` field is
//! refreshed from the generated content.
//!
//! ## Incremental behaviour
//!
//! `convert` stamps each note with a hash of its source comment and skips notes
//! whose comment has not changed since the last run. `enhance` only generates
//! content for placeholder sections, so running it twice is a no-op: the second
//! run issues no requests at all.
//!
//! ## Usage
//!
//! ```sh
//! # One note per card comment
//! trello-note-export convert board.json -o notes --tags trello,inbox
//!
//! # Fill in the templated sections of every note
//! trello-note-export enhance notes enhanced --model google/gemma-3-27b
//! ```
//!
//! Preferences can be persisted in `~/.config/trello-note-export/config.toml`.

pub mod convert;
pub mod document;
pub mod enhance;
pub mod importer;
pub mod parallel;
#[cfg(feature = "sequential")]
pub mod sequential;
pub mod utils;
