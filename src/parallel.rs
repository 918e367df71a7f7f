//! Default batch path: enhance every note in a directory with a small
//! worker pool. Each worker owns its own HTTP client; notes are independent,
//! so no coordination beyond the work queue is needed.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, bounded};
use eyre::{Context, Result};

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

    let (tx, rx) = bounded::<PathBuf>(64);
    let count_enhanced = AtomicUsize::new(0);
    let count_complete = AtomicUsize::new(0);
    let count_warnings = AtomicUsize::new(0);
    let count_errors = AtomicUsize::new(0);
    // The model server handles one generation at a time; a few workers keep
    // its queue full without piling up timeouts.
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(4);

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (count_enhanced, count_complete, count_warnings, count_errors) = (
                &count_enhanced,
                &count_complete,
                &count_warnings,
                &count_errors,
            );

            s.spawn(move || {
                let client = match LmClient::new(options.config.clone()) {
                    Ok(c) => c,
                    Err(e) => {
                        eprintln!("Worker client setup failed: {e}");
                        return;
                    }
                };

                while let Ok(path) = rx.recv() {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());

                    match enhance::enhance_note_file(&path, &options.output_dir, &client) {
                        Ok(outcome) => {
                            for w in &outcome.report.warnings {
                                eprintln!("Warning [{name}] {}: {}", w.heading, w.message);
                            }
                            count_warnings
                                .fetch_add(outcome.report.warnings.len(), Ordering::Relaxed);
                            if outcome.report.attempted == 0 {
                                count_complete.fetch_add(1, Ordering::Relaxed);
                                if options.verbose {
                                    eprintln!("Complete: {name}");
                                }
                            } else {
                                count_enhanced.fetch_add(1, Ordering::Relaxed);
                                if options.verbose {
                                    eprintln!("Enhanced: {name}");
                                }
                            }
                        }
                        Err(e) => {
                            count_errors.fetch_add(1, Ordering::Relaxed);
                            eprintln!("Error [{name}]: {e:#}");
                        }
                    }
                }
            });
        }

        drop(rx);

        'outer: for note in &notes {
            let mut pending = note.clone();
            loop {
                match tx.send_timeout(pending, Duration::from_millis(50)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                    Err(SendTimeoutError::Timeout(r)) => {
                        pending = r;
                    }
                }
            }
        }

        drop(tx);
    });

    if !options.quiet {
        eprintln!(
            "Done. {} enhanced, {} already complete. Warnings: {}. Errors: {}",
            count_enhanced.load(Ordering::Relaxed),
            count_complete.load(Ordering::Relaxed),
            count_warnings.load(Ordering::Relaxed),
            count_errors.load(Ordering::Relaxed),
        );
    }

    Ok(())
}
