//! Rule-based intent classification — lower-cased keyword matching against
//! fixed phrase sets, plus filename extraction against the live file index.
//! Kept behind the `Classifier` trait so a statistical model can be swapped
//! in without touching the pipeline.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::index::FileIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Rename,
    Patch,
    Create,
    Reflect,
    Improve,
    Feature,
    Locate,
    Chat,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rename => "rename",
            Self::Patch => "patch",
            Self::Create => "create",
            Self::Reflect => "reflect",
            Self::Improve => "improve",
            Self::Feature => "feature",
            Self::Locate => "locate",
            Self::Chat => "chat",
        };
        write!(f, "{s}")
    }
}

/// One classified user turn. Immutable; consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    /// Resolved index paths, first-seen order, deduplicated. May be empty
    /// even for `Patch` — callers treat that as "no target found".
    pub filenames: Vec<String>,
    pub task: String,
}

pub trait Classifier {
    fn classify(&self, text: &str, index: &FileIndex) -> Command;
}

const RENAME_WORDS: &[&str] = &["rename", "move"];
const PATCH_WORDS: &[&str] = &["patch", "update", "fix", "refactor", "modify"];
const CREATE_PHRASES: &[&str] = &["create file", "make new file"];
const FEATURE_PHRASES: &[&str] = &["feature request", "feature"];
const LOCATE_PHRASES: &[&str] = &["where is", "locate", "find"];

/// Extensions tried against bare words when extracting filename candidates.
const BARE_WORD_EXTENSIONS: &[&str] = &["py", "json", "yaml", "md", "log", "txt"];

lazy_static! {
    static ref FILE_TOKEN: Regex = Regex::new(r"\b[\w/\\.-]+\.\w{1,10}\b").unwrap();
    static ref BARE_WORD: Regex = Regex::new(r"\b\w+\b").unwrap();
    static ref REFLECT_RE: Regex = Regex::new(r"\bself\s+reflect\b").unwrap();
    static ref IMPROVE_RE: Regex = Regex::new(r"\bself\s+improve\b").unwrap();
    static ref TRACE_FILE: Regex = Regex::new(r#"File "(.+?)", line (\d+)"#).unwrap();
}

#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str, index: &FileIndex) -> Command {
        let lower = text.to_lowercase();
        let filenames = extract_filenames(text, index);

        let kind = if RENAME_WORDS.iter().any(|k| lower.contains(k)) {
            CommandKind::Rename
        } else if PATCH_WORDS.iter().any(|k| lower.contains(k)) {
            CommandKind::Patch
        } else if CREATE_PHRASES.iter().any(|k| lower.contains(k)) {
            CommandKind::Create
        } else if REFLECT_RE.is_match(&lower) {
            CommandKind::Reflect
        } else if IMPROVE_RE.is_match(&lower) {
            CommandKind::Improve
        } else if FEATURE_PHRASES.iter().any(|k| lower.contains(k)) {
            CommandKind::Feature
        } else if LOCATE_PHRASES.iter().any(|k| lower.contains(k)) {
            CommandKind::Locate
        } else {
            CommandKind::Chat
        };

        Command {
            kind,
            filenames,
            task: text.to_string(),
        }
    }
}

/// Two-pass candidate extraction: explicit `name.ext` tokens, then bare
/// words tried with a fixed extension list. Every candidate is checked
/// against the index; survivors keep first-seen order.
fn extract_filenames(text: &str, index: &FileIndex) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    let mut try_candidate = |cand: &str, found: &mut Vec<String>| {
        let norm = cand.replace('\\', "/");
        if let Some(path) = index.resolve(&norm) {
            if !found.iter().any(|f| f == path) {
                found.push(path.to_string());
            }
        }
    };

    for m in FILE_TOKEN.find_iter(text) {
        try_candidate(m.as_str(), &mut found);
    }
    for m in BARE_WORD.find_iter(text) {
        let word = m.as_str();
        if word.contains('.') {
            continue;
        }
        for ext in BARE_WORD_EXTENSIONS {
            try_candidate(&format!("{word}.{ext}"), &mut found);
        }
    }
    found
}

/// Scan text for interpreter-traceback lines and extract the failing file
/// plus a one-line description. Returns `None` unless both are present.
pub fn detect_traceback(text: &str) -> Option<(String, String)> {
    let mut file: Option<String> = None;
    let mut desc: Option<String> = None;
    for line in text.lines() {
        if let Some(caps) = TRACE_FILE.captures(line) {
            let fname = caps[1].replace('\\', "/");
            desc = Some(format!("Error at line {} in {}", &caps[2], fname));
            file = Some(fname);
        } else if file.is_some() && (line.contains("Error") || line.contains("Exception")) {
            desc = Some(line.trim().to_string());
        }
    }
    match (file, desc) {
        (Some(f), Some(d)) => Some((f, d)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn index_with(files: &[&str]) -> (tempfile::TempDir, FileIndex) {
        let tmp = tempfile::tempdir().unwrap();
        for rel in files {
            let p = tmp.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "x").unwrap();
        }
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        (tmp, idx)
    }

    fn classify(text: &str, idx: &FileIndex) -> Command {
        KeywordClassifier.classify(text, idx)
    }

    #[test]
    fn patch_keywords_win_over_locate() {
        let (_t, idx) = index_with(&["src/app.py"]);
        let cmd = classify("please fix app.py where is it broken", &idx);
        assert_eq!(cmd.kind, CommandKind::Patch);
        assert_eq!(cmd.filenames, vec!["src/app.py"]);
        assert_eq!(cmd.task, "please fix app.py where is it broken");
    }

    #[test]
    fn rename_has_highest_priority() {
        let (_t, idx) = index_with(&[]);
        assert_eq!(classify("rename and fix things", &idx).kind, CommandKind::Rename);
    }

    #[test]
    fn patch_without_target_keeps_empty_list() {
        let (_t, idx) = index_with(&["src/app.py"]);
        let cmd = classify("update the scheduler module", &idx);
        assert_eq!(cmd.kind, CommandKind::Patch);
        assert!(cmd.filenames.is_empty());
    }

    #[test]
    fn bare_word_gets_extension_candidates() {
        let (_t, idx) = index_with(&["notes/readme.md", "logs/server.log"]);
        let cmd = classify("where is readme", &idx);
        assert_eq!(cmd.kind, CommandKind::Locate);
        assert_eq!(cmd.filenames, vec!["notes/readme.md"]);
    }

    #[test]
    fn filenames_dedup_preserves_first_seen_order() {
        let (_t, idx) = index_with(&["a.py", "b.py"]);
        let cmd = classify("fix b.py then a.py then b.py again", &idx);
        assert_eq!(cmd.filenames, vec!["b.py", "a.py"]);
    }

    #[test]
    fn reflect_and_improve_need_the_self_prefix() {
        let (_t, idx) = index_with(&[]);
        assert_eq!(classify("time to self reflect", &idx).kind, CommandKind::Reflect);
        assert_eq!(classify("please self improve", &idx).kind, CommandKind::Improve);
        assert_eq!(classify("reflect on life", &idx).kind, CommandKind::Chat);
    }

    #[test]
    fn default_is_chat() {
        let (_t, idx) = index_with(&[]);
        assert_eq!(classify("hello there", &idx).kind, CommandKind::Chat);
    }

    #[test]
    fn traceback_extracts_file_and_description() {
        let text = "Traceback (most recent call last):\n  File \"app/main.py\", line 42, in run\nValueError: bad input";
        let (file, desc) = detect_traceback(text).unwrap();
        assert_eq!(file, "app/main.py");
        assert_eq!(desc, "ValueError: bad input");
    }

    #[test]
    fn traceback_requires_both_parts() {
        assert!(detect_traceback("ValueError: bad input").is_none());
        assert!(detect_traceback("all good here").is_none());
    }
}
