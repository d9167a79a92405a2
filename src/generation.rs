//! Generation Client boundary: prompt in, text out. The Ollama adapter is
//! the only real implementation; tests substitute the trait. Errors are
//! typed so the caller can tell a dead endpoint from an empty completion.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::http;
use crate::search::SearchProvider;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("generation timed out")]
    Timeout,
    #[error("generation produced no text")]
    Empty,
}

fn map_http_err(err: anyhow::Error) -> GenError {
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if matches!(
            io.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) {
            return GenError::Timeout;
        }
    }
    GenError::Transport(err.to_string())
}

pub trait GenerationClient: Send {
    fn generate(&self, prompt: &str) -> Result<String, GenError>;
}

/// Ollama `/api/generate` over plain HTTP. The endpoint streams NDJSON;
/// `response` pieces are concatenated, unparsable lines skipped.
#[derive(Debug)]
pub struct OllamaClient {
    host: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaClient {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            host: config.host.clone(),
            model: config.model.clone(),
            timeout_ms: config.timeout_ms,
        }
    }
}

#[derive(Deserialize)]
struct GeneratePiece {
    response: Option<String>,
}

impl GenerationClient for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, GenError> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let body = serde_json::to_string(&payload)
            .map_err(|e| GenError::Transport(e.to_string()))?;
        let raw = http::post(&self.host, "/api/generate", &body, self.timeout_ms)
            .map_err(map_http_err)?;

        let mut pieces = String::new();
        for line in raw.lines() {
            if let Ok(piece) = serde_json::from_str::<GeneratePiece>(line) {
                if let Some(text) = piece.response {
                    pieces.push_str(&text);
                }
            }
        }
        let text = pieces.trim().to_string();
        if text.is_empty() {
            return Err(GenError::Empty);
        }
        Ok(text)
    }
}

lazy_static! {
    static ref UNCERTAIN: Regex =
        Regex::new(r"(?i)\b(i don['’]t know|not sure|no idea)\b").unwrap();
}

/// Ask the client; when the reply sounds uncertain, augment the prompt with
/// web snippets and retry exactly once. The second answer stands either way.
pub fn ask(
    client: &dyn GenerationClient,
    search: &dyn SearchProvider,
    prompt: &str,
    uncertainty_retry: bool,
) -> Result<String, GenError> {
    let reply = client.generate(prompt)?;
    if !uncertainty_retry || !UNCERTAIN.is_match(&reply) {
        return Ok(reply);
    }

    let snippets = search.search(prompt);
    if snippets.is_empty() {
        return Ok(reply);
    }
    let listed = snippets
        .iter()
        .take(5)
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    let enhanced = format!("{prompt}\n\n# Web results:\n{listed}");
    client.generate(&enhanced)
}
