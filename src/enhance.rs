//! Enhancement client: placeholder detection, prompt construction, the
//! chat-completion HTTP calls that fill a note's templated sections, and the
//! per-note pipeline that drives them.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, thread};

use eyre::{Context, Result, eyre};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::document::NoteDocument;
use crate::utils;

/// Heading of the section whose content seeds every prompt.
pub const SECTION_INTRO: &str = "SECTION 1: INTRODUCTION/OVERVIEW";

/// Slugified tag candidates longer than this are prose, not tags.
const MAX_TAG_LEN: usize = 30;

#[derive(Debug, Clone)]
pub struct EnhanceConfig {
    /// Base URL of the OpenAI-compatible endpoint, e.g. `http://localhost:1234/v1`.
    pub api_base: Url,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Per-request deadline.
    pub timeout: Duration,
    /// Additional attempts after the first failed call.
    pub retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse("http://localhost:1234/v1").expect("default api base"),
            model: "google/gemma-3-27b".to_string(),
            api_key: None,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
            retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("generation endpoint unreachable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    #[error("invalid response from generation endpoint: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

enum SendFailure {
    /// Transport errors and server-side errors; worth another attempt.
    Retryable(String),
    Fatal(EnhanceError),
}

/// Blocking client for an OpenAI-compatible chat-completion endpoint.
/// Holds no state beyond the connection pool; every call is independent.
pub struct LmClient {
    http: Client,
    config: EnhanceConfig,
}

impl LmClient {
    pub fn new(config: EnhanceConfig) -> Result<Self, EnhanceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EnhanceError::ClientBuild)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.as_str().trim_end_matches('/')
        )
    }

    /// Send a prompt and return the generated text, retrying transient
    /// failures with a fixed delay.
    pub fn generate(&self, messages: &[ChatMessage]) -> Result<String, EnhanceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };
        let url = self.endpoint();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_once(&url, &request) {
                Ok(text) => return Ok(text),
                Err(SendFailure::Fatal(err)) => return Err(err),
                Err(SendFailure::Retryable(last_error)) => {
                    if attempts > self.config.retries {
                        return Err(EnhanceError::ServiceUnavailable {
                            attempts,
                            last_error,
                        });
                    }
                    thread::sleep(self.config.retry_delay);
                }
            }
        }
    }

    fn send_once(&self, url: &str, request: &ChatRequest) -> Result<String, SendFailure> {
        let mut builder = self.http.post(url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .map_err(|e| SendFailure::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(SendFailure::Retryable(format!("endpoint returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SendFailure::Fatal(EnhanceError::InvalidResponse(format!(
                "endpoint returned {status}: {}",
                body.trim()
            ))));
        }

        let payload: ChatResponse = response.json().map_err(|e| {
            SendFailure::Fatal(EnhanceError::InvalidResponse(format!(
                "could not decode payload: {e}"
            )))
        })?;
        match payload.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.trim().to_string()),
            None => Err(SendFailure::Fatal(EnhanceError::InvalidResponse(
                "response contained no choices".to_string(),
            ))),
        }
    }

    /// Ask the model for a short tag list describing `document_text`.
    pub fn derive_tags(&self, document_text: &str) -> Result<Vec<String>, EnhanceError> {
        let reply = self.generate(&build_tag_prompt(document_text))?;
        let tags = parse_tag_reply(&reply);
        if tags.is_empty() {
            return Err(EnhanceError::InvalidResponse(format!(
                "could not parse a tag list from {reply:?}"
            )));
        }
        Ok(tags)
    }
}

/// True when a section body still holds the template's bracketed instruction
/// text rather than authored content.
pub fn is_placeholder(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return true;
    }
    // Bullet stand-ins like `*   **Concept 1:** [First key concept]`.
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .all(|line| {
            let Some(rest) = line.strip_prefix('*').or_else(|| line.strip_prefix('-')) else {
                return false;
            };
            let Some(open) = rest.find('[') else {
                return false;
            };
            match rest[open..].find(']') {
                // Markdown links are bracketed too; `](` means authored content.
                Some(close) => !rest[open + close..].starts_with("]("),
                None => false,
            }
        })
}

/// Deterministic prompt for filling one section from the note's introduction.
pub fn build_prompt(
    section_heading: &str,
    title: &str,
    context: &str,
    placeholder: &str,
) -> Vec<ChatMessage> {
    let system = "You expand study notes. Given the introduction section of a note, \
                  write concise, information-rich content for one named section of \
                  the same note. Follow Markdown requirements.";
    let user = format!(
        "You are provided the introduction section of the note titled \"{title}\":\n\
         \n\
         <INTRODUCTION>\n\
         {context}\n\
         </INTRODUCTION>\n\
         \n\
         Using only the information above and widely accepted background knowledge, \
         write the body of this section of the same note:\n\
         \n\
         ## {section_heading}\n\
         \n\
         The section currently holds this template instruction:\n\
         \n\
         {placeholder}\n\
         \n\
         Guidelines:\n\
         - Return only the section body, without the heading line.\n\
         - Provide informative explanations in full sentences.\n\
         - Prefer bullet lists with at least three well-developed items.\n\
         - Do not add any extra sections or commentary."
    );
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: user,
        },
    ]
}

fn build_tag_prompt(document_text: &str) -> Vec<ChatMessage> {
    let system = "You label study notes for a personal knowledge base.";
    let user = format!(
        "Propose tags for the following note:\n\
         \n\
         <NOTE>\n\
         {document_text}\n\
         </NOTE>\n\
         \n\
         Reply with 3 to 6 short lowercase tags separated by commas, nothing else."
    );
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: user,
        },
    ]
}

/// Turn a free-form model reply into a deduplicated, ordered list of
/// lowercase tags. Tolerates comma lists, bullet lists, a `Tags:` label and
/// code fences; everything else about the reply shape is the model's whim,
/// which is why this lives here and not in the document model.
pub fn parse_tag_reply(reply: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        let line = line.trim_start_matches(['-', '*']).trim();
        let line = line
            .strip_prefix("Tags:")
            .or_else(|| line.strip_prefix("tags:"))
            .unwrap_or(line);
        for piece in line.split(',') {
            let tag = slug::slugify(piece);
            if !tag.is_empty() && tag.len() <= MAX_TAG_LEN && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Models tend to echo the heading they were asked to fill. Drop a leading
/// `## <heading>` (or bare heading) line so re-parsing the note does not see
/// a duplicate section.
fn strip_heading_echo<'a>(text: &'a str, heading: &str) -> &'a str {
    let trimmed = text.trim_start();
    let with_marker = format!("## {heading}");
    for prefix in [with_marker.as_str(), heading] {
        if let Some(rest) = trimmed.strip_prefix(prefix)
            && (rest.is_empty() || rest.starts_with('\n'))
        {
            return rest.trim_start();
        }
    }
    text
}

#[derive(Debug)]
pub struct SectionWarning {
    pub heading: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct EnhanceReport {
    /// Sections that held template instructions at the start of the pass.
    pub attempted: usize,
    pub replaced: usize,
    pub warnings: Vec<SectionWarning>,
}

/// Fill every placeholder section of `doc` and refresh its tags.
///
/// Per-section failures leave the placeholder untouched and are collected as
/// warnings; already-authored sections are never touched. Tags are derived
/// from the enhanced render, never from placeholder text, and a note with
/// nothing to fill keeps its existing tags, so a second pass over the same
/// note performs no generation calls.
pub fn enhance_document(doc: &mut NoteDocument, client: &LmClient) -> EnhanceReport {
    let title = doc.title.clone();

    let mut context = String::new();
    for heading in [SECTION_INTRO, title.as_str()] {
        if let Some(section) = doc.get_section(heading)
            && !section.body.is_empty()
            && !is_placeholder(&section.body)
        {
            context = section.body.clone();
            break;
        }
    }

    let targets: Vec<(String, String)> = doc
        .sections()
        .iter()
        .filter(|s| is_placeholder(&s.body))
        .map(|s| (s.heading.clone(), s.body.clone()))
        .collect();

    let mut report = EnhanceReport {
        attempted: targets.len(),
        ..EnhanceReport::default()
    };

    for (heading, placeholder) in &targets {
        let messages = build_prompt(heading, &title, &context, placeholder);
        let outcome = client.generate(&messages).map_err(|e| e.to_string()).and_then(|text| {
            doc.replace_section_body(heading, strip_heading_echo(&text, heading))
                .map_err(|e| e.to_string())
        });
        match outcome {
            Ok(()) => report.replaced += 1,
            Err(message) => report.warnings.push(SectionWarning {
                heading: heading.clone(),
                message,
            }),
        }
    }

    if report.replaced > 0 {
        match client.derive_tags(&doc.render()) {
            Ok(tags) => doc.set_front_matter("tags", tags),
            Err(e) => report.warnings.push(SectionWarning {
                heading: "tags".to_string(),
                message: e.to_string(),
            }),
        }
    }

    report
}

#[derive(Debug)]
pub struct EnhanceOutcome {
    pub destination: PathBuf,
    pub report: EnhanceReport,
}

/// Enhance a single note file and write the result into `output_dir` under
/// the same filename. Parse failures abort before any output I/O, and the
/// write goes through a temporary file, so a failed note never leaves a
/// partial file behind.
pub fn enhance_note_file(
    note_path: &Path,
    output_dir: &Path,
    client: &LmClient,
) -> Result<EnhanceOutcome> {
    let text = fs::read_to_string(note_path)
        .wrap_err_with(|| format!("Failed to read note: {}", note_path.display()))?;
    let mut doc = NoteDocument::parse(&text)
        .wrap_err_with(|| format!("Failed to parse note: {}", note_path.display()))?;

    let report = enhance_document(&mut doc, client);

    let file_name = note_path
        .file_name()
        .ok_or_else(|| eyre!("Input has no file name: {}", note_path.display()))?;
    fs::create_dir_all(output_dir)
        .wrap_err_with(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    let destination = output_dir.join(file_name);
    utils::write_note(&destination, &doc.render())?;

    Ok(EnhanceOutcome {
        destination,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base: &str) -> EnhanceConfig {
        EnhanceConfig {
            api_base: Url::parse(base).unwrap(),
            timeout: Duration::from_secs(5),
            retries: 2,
            retry_delay: Duration::ZERO,
            ..EnhanceConfig::default()
        }
    }

    fn chat_body(content: &str) -> String {
        format!(
            r#"{{"choices":[{{"message":{{"role":"assistant","content":"{content}"}}}}]}}"#
        )
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder("[Definition and explanation]"));
        assert!(is_placeholder("  [Links to the source material]  "));
        assert!(is_placeholder(
            "*   **Concept 1:** [First key concept]\n*   **Concept 2:** [Second key concept]"
        ));
        assert!(!is_placeholder(
            "The mitochondria is the powerhouse of the cell."
        ));
        assert!(!is_placeholder("* [Spaced Repetition](https://example.com)"));
        assert!(!is_placeholder(""));
        assert!(!is_placeholder("   \n  "));
    }

    #[test]
    fn prompts_are_deterministic() {
        let a = build_prompt("SECTION 2: KEY CONCEPTS/DEFINITIONS", "T", "ctx", "[x]");
        let b = build_prompt("SECTION 2: KEY CONCEPTS/DEFINITIONS", "T", "ctx", "[x]");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].role, "system");
        assert_eq!(a[1].content, b[1].content);
        assert!(a[1].content.contains("SECTION 2: KEY CONCEPTS/DEFINITIONS"));
        assert!(a[1].content.contains("<INTRODUCTION>\nctx\n</INTRODUCTION>"));
    }

    #[test]
    fn tag_reply_parsing() {
        assert_eq!(parse_tag_reply("reading, memory"), vec!["reading", "memory"]);
        assert_eq!(
            parse_tag_reply("Tags: Reading, MEMORY, reading"),
            vec!["reading", "memory"]
        );
        assert_eq!(
            parse_tag_reply("- Reading\n- Deep Work"),
            vec!["reading", "deep-work"]
        );
        assert_eq!(
            parse_tag_reply("```\nreading, memory\n```"),
            vec!["reading", "memory"]
        );
        // Prose is not a tag.
        assert_eq!(
            parse_tag_reply("Here is a helpful list of the tags you requested"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn heading_echo_is_stripped() {
        assert_eq!(
            strip_heading_echo("## SECTION 2: X\n\nBody text.", "SECTION 2: X"),
            "Body text."
        );
        assert_eq!(
            strip_heading_echo("SECTION 2: X\nBody text.", "SECTION 2: X"),
            "Body text."
        );
        assert_eq!(
            strip_heading_echo("Body mentioning SECTION 2: X later.", "SECTION 2: X"),
            "Body mentioning SECTION 2: X later."
        );
    }

    #[test]
    fn generate_returns_choice_content() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("  Generated text.  "))
            .create();

        let mut config = test_config(&server.url());
        config.api_key = Some("secret".to_string());
        let client = LmClient::new(config).unwrap();

        let reply = client
            .generate(&build_prompt("SECTION 2: X", "T", "ctx", "[x]"))
            .unwrap();
        assert_eq!(reply, "Generated text.");
        mock.assert();
    }

    #[test]
    fn server_errors_exhaust_retries() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .expect(3)
            .create();

        let client = LmClient::new(test_config(&server.url())).unwrap();
        let err = client
            .generate(&build_prompt("SECTION 2: X", "T", "ctx", "[x]"))
            .unwrap_err();
        assert!(
            matches!(err, EnhanceError::ServiceUnavailable { attempts: 3, .. }),
            "{err}"
        );
        mock.assert();
    }

    #[test]
    fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("unauthorized")
            .expect(1)
            .create();

        let client = LmClient::new(test_config(&server.url())).unwrap();
        let err = client
            .generate(&build_prompt("SECTION 2: X", "T", "ctx", "[x]"))
            .unwrap_err();
        assert!(matches!(err, EnhanceError::InvalidResponse(_)), "{err}");
        mock.assert();
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create();

        let client = LmClient::new(test_config(&server.url())).unwrap();
        let err = client
            .generate(&build_prompt("SECTION 2: X", "T", "ctx", "[x]"))
            .unwrap_err();
        assert!(matches!(err, EnhanceError::InvalidResponse(_)), "{err}");
    }

    #[test]
    fn derive_tags_normalizes_the_reply() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("Tags: Reading, MEMORY, reading"))
            .create();

        let client = LmClient::new(test_config(&server.url())).unwrap();
        let tags = client.derive_tags("some note text").unwrap();
        assert_eq!(tags, vec!["reading", "memory"]);
    }
}
