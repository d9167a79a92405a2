//! Turns one queued task into a candidate rewrite: prompt from the current
//! file content, one generation call, best-effort code-block extraction,
//! and a dated patch note written before anything touches the tree.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::generation::{self, GenerationClient};
use crate::persona;
use crate::search::SearchProvider;
use crate::updater::write_patch_note;

#[derive(Debug)]
pub struct Proposal {
    /// Candidate replacement for the whole file.
    pub candidate: String,
    /// Note recording the raw candidate, written before any apply step.
    pub note: PathBuf,
}

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*)\r?\n?(.*?)```").unwrap();
}

/// Best-effort extraction of the first fenced code block; a reply without
/// fences is taken verbatim. The fallback is a first-class path, not an
/// error.
pub fn extract_code(reply: &str) -> String {
    match CODE_FENCE.captures(reply) {
        Some(caps) => caps[1].trim_end().to_string(),
        None => reply.trim().to_string(),
    }
}

pub struct Proposer<'a> {
    client: &'a dyn GenerationClient,
    search: &'a dyn SearchProvider,
    notes_dir: PathBuf,
    uncertainty_retry: bool,
    verbose: u8,
}

impl<'a> Proposer<'a> {
    pub fn new(
        client: &'a dyn GenerationClient,
        search: &'a dyn SearchProvider,
        notes_dir: PathBuf,
        uncertainty_retry: bool,
        verbose: u8,
    ) -> Self {
        Self {
            client,
            search,
            notes_dir,
            uncertainty_retry,
            verbose,
        }
    }

    /// `None` means the task was abandoned (missing target or generation
    /// failure) — logged, no note written, never an error for the caller.
    pub fn propose(&self, path: &Path, description: &str) -> Result<Option<Proposal>> {
        if !path.exists() {
            eprintln!("[proposer] cannot propose patch: {} not found", path.display());
            return Ok(None);
        }
        let original = fs::read_to_string(path).unwrap_or_default();
        let prompt = persona::patch_prompt(description, &path.display().to_string(), &original);

        let reply = match generation::ask(self.client, self.search, &prompt, self.uncertainty_retry)
        {
            Ok(reply) => reply,
            Err(err) => {
                eprintln!("[proposer] generation failed for {}: {err}", path.display());
                return Ok(None);
            }
        };

        let candidate = extract_code(&reply);
        let note = write_patch_note(&self.notes_dir, path, &candidate)?;
        if self.verbose > 0 {
            eprintln!("[proposer] candidate note: {}", note.display());
        }
        Ok(Some(Proposal { candidate, note }))
    }
}
