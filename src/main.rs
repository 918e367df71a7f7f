use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use url::Url;

use trello_note_export::convert::{self, ConvertOptions};
use trello_note_export::enhance::{self, EnhanceConfig, LmClient};
#[cfg(not(feature = "sequential"))]
use trello_note_export::parallel;
#[cfg(feature = "sequential")]
use trello_note_export::sequential;
use trello_note_export::utils::EnhanceOptions;

/// Convert Trello board exports into Markdown study notes and fill their
/// templated sections with a locally hosted LLM.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/trello-note-export/config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Print each file written or skipped.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress summary output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create one Markdown note per card comment in a board export.
    Convert {
        /// Trello board export JSON file.
        board_json: PathBuf,

        /// Directory for the generated notes.
        /// Defaults to ./notes if not set in config.
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Comma-separated tags to seed each note's frontmatter (e.g. "trello,inbox").
        #[arg(long, value_name = "TAGS", value_delimiter = ',')]
        tags: Option<Vec<String>>,

        /// Rewrite notes even if the source comment is unchanged.
        #[arg(short, long)]
        force: bool,
    },

    /// Fill the templated sections of existing notes with generated content.
    Enhance {
        /// A note file, or a directory of notes.
        input: PathBuf,

        /// Directory where the enhanced notes are written.
        output_dir: PathBuf,

        /// Base URL of the OpenAI-compatible endpoint.
        #[arg(long, value_name = "URL")]
        api_base: Option<Url>,

        /// Model name to request.
        #[arg(long, value_name = "NAME")]
        model: Option<String>,

        /// API key for authenticated endpoints.
        /// Falls back to the LM_STUDIO_API_KEY environment variable.
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,

        /// Sampling temperature.
        #[arg(long, value_name = "FLOAT")]
        temperature: Option<f32>,

        /// Per-request timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Extra attempts per request after the first failure.
        #[arg(long, value_name = "N")]
        retries: Option<u32>,
    },
}

#[derive(Deserialize, Default)]
struct FileConfig {
    output_dir: Option<PathBuf>,
    tags: Option<Vec<String>>,
    api_base: Option<Url>,
    model: Option<String>,
    api_key: Option<String>,
    temperature: Option<f32>,
    timeout_seconds: Option<u64>,
    retries: Option<u32>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("trello-note-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    match cli.command {
        Command::Convert {
            board_json,
            output,
            tags,
            force,
        } => {
            if !board_json.is_file() {
                return Err(eyre!("Board export not found: {}", board_json.display()));
            }

            // 2. Resolve options (CLI > Config > Default)
            let options = ConvertOptions {
                output_dir: output
                    .or(file_cfg.output_dir)
                    .unwrap_or_else(|| PathBuf::from("notes")),
                tags: tags.or(file_cfg.tags),
                force,
                verbose: cli.verbose,
                quiet: cli.quiet,
            };

            convert::execute(&board_json, &options)?;
            Ok(())
        }

        Command::Enhance {
            input,
            output_dir,
            api_base,
            model,
            api_key,
            temperature,
            timeout,
            retries,
        } => {
            // 2. Resolve the generation config (CLI > Config > Default)
            let mut config = EnhanceConfig::default();
            if let Some(base) = api_base.or(file_cfg.api_base) {
                config.api_base = base;
            }
            if let Some(model) = model.or(file_cfg.model) {
                config.model = model;
            }
            config.api_key = api_key
                .or(file_cfg.api_key)
                .or_else(|| std::env::var("LM_STUDIO_API_KEY").ok());
            if let Some(t) = temperature.or(file_cfg.temperature) {
                config.temperature = t;
            }
            if let Some(secs) = timeout.or(file_cfg.timeout_seconds) {
                config.timeout = Duration::from_secs(secs);
            }
            if let Some(n) = retries.or(file_cfg.retries) {
                config.retries = n;
            }

            // 3. Run the Business Logic
            if input.is_file() {
                let client = LmClient::new(config)?;
                let outcome = enhance::enhance_note_file(&input, &output_dir, &client)?;
                for w in &outcome.report.warnings {
                    eprintln!("Warning [{}]: {}", w.heading, w.message);
                }
                if !cli.quiet {
                    eprintln!("Enhanced note written to {}", outcome.destination.display());
                }
                Ok(())
            } else if input.is_dir() {
                let options = EnhanceOptions {
                    input,
                    output_dir,
                    config,
                    verbose: cli.verbose,
                    quiet: cli.quiet,
                };

                #[cfg(feature = "sequential")]
                return sequential::execute(&options);

                #[cfg(not(feature = "sequential"))]
                parallel::execute(&options)
            } else {
                Err(eyre!("Input not found: {}", input.display()))
            }
        }
    }
}
