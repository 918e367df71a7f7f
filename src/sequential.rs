//! Sequential batch path with progress bars, compiled behind the
//! `sequential` feature. Same walk as `parallel`, one note at a time.

use std::fs;

use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::enhance::{self, LmClient};
use crate::utils::{self, EnhanceOptions};

pub fn execute(options: &EnhanceOptions) -> Result<()> {
    fs::create_dir_all(&options.output_dir).wrap_err("Failed to create output dir")?;

    let notes = utils::collect_notes(&options.input)?;
    if notes.is_empty() {
        if !options.quiet {
            eprintln!("No notes found in {}", options.input.display());
        }
        return Ok(());
    }

    let client = LmClient::new(options.config.clone())?;

    let pb = if options.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(notes.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .unwrap()
            .progress_chars("=>-"),
        );
        bar.println(format!("Found {} notes.", notes.len()));
        bar
    };

    let mut count_enhanced = 0usize;
    let mut count_complete = 0usize;
    let mut count_warnings = 0usize;
    let mut count_errors = 0usize;

    for path in &notes {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match enhance::enhance_note_file(path, &options.output_dir, &client) {
            Ok(outcome) => {
                for w in &outcome.report.warnings {
                    pb.println(format!("Warning [{name}] {}: {}", w.heading, w.message));
                }
                count_warnings += outcome.report.warnings.len();
                if outcome.report.attempted == 0 {
                    count_complete += 1;
                    if options.verbose {
                        pb.println(format!("Complete: {name}"));
                    }
                } else {
                    count_enhanced += 1;
                    if options.verbose {
                        pb.println(format!("Enhanced: {name}"));
                    }
                }
            }
            Err(e) => {
                count_errors += 1;
                pb.println(format!("Error [{name}]: {e:#}"));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !options.quiet {
        eprintln!(
            "Done. {count_enhanced} enhanced, {count_complete} already complete. \
             Warnings: {count_warnings}. Errors: {count_errors}",
        );
    }

    Ok(())
}
