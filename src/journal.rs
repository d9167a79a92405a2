//! Durable ledgers: the append-only interaction log and the feedback loop.
//! Feedback is a sweep-and-compact pass — `new` records are consumed into
//! the rolling context and archived as `seen`; the live file is rewritten
//! without them. Malformed lines are skipped individually and preserved.

use anyhow::{Context, Result};
use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::workspace::Workspace;

/// Rolling window of consumed feedback payloads kept in context.json.
const RECENT_FEEDBACK_CAP: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    timestamp: String,
    user: String,
    ai: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub status: String,
    pub payload: Value,
}

/// Append one `{timestamp,user,ai}` line to the interaction log.
pub fn log_interaction(ws: &Workspace, user: &str, ai: &str) -> Result<()> {
    let entry = LogEntry {
        timestamp: Local::now().to_rfc3339(),
        user: user.to_string(),
        ai: ai.to_string(),
    };
    let line = serde_json::to_string(&entry)?;
    let path = ws.log_file();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Rolling context as pretty JSON for the chat prompt; parse failures are
/// reported inline rather than aborting the turn.
pub fn context_for_prompt(ws: &Workspace) -> String {
    let path = ws.context_file();
    if !path.exists() {
        return "{}".to_string();
    }
    match fs::read_to_string(&path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
    {
        Some(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()),
        None => "(context load failed)".to_string(),
    }
}

fn load_context(path: &Path) -> Value {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| json!({}))
}

/// Sidecar flock released on drop (fs2 unlocks when the fd closes).
struct SweepLock {
    _file: File,
}

impl SweepLock {
    fn acquire(target: &Path) -> Result<Self> {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to flock {}", lock_path.display()))?;
        Ok(Self { _file: file })
    }
}

/// One feedback-learning pass. Returns how many `new` records were consumed.
pub fn feedback_pass(ws: &Workspace, verbose: u8) -> Result<usize> {
    let live_path = ws.feedback_file();
    if !live_path.exists() {
        return Ok(0);
    }
    let _lock = SweepLock::acquire(&live_path)?;

    let raw = fs::read_to_string(&live_path)
        .with_context(|| format!("Failed to read {}", live_path.display()))?;

    let mut survivors: Vec<String> = Vec::new();
    let mut consumed: Vec<FeedbackRecord> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedbackRecord>(line) {
            Ok(mut record) if record.status == "new" => {
                record.status = "seen".to_string();
                consumed.push(record);
            }
            Ok(_) => survivors.push(line.to_string()),
            Err(err) => {
                if verbose > 0 {
                    eprintln!("[feedback] skipping malformed line: {err}");
                }
                survivors.push(line.to_string());
            }
        }
    }

    if consumed.is_empty() {
        return Ok(0);
    }

    // Archive first so a crash between the two writes loses nothing.
    let archive_path = ws.feedback_archive();
    let mut archive = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    for record in &consumed {
        writeln!(archive, "{}", serde_json::to_string(record)?)?;
    }

    let mut context = load_context(&ws.context_file());
    {
        let recent = context
            .as_object_mut()
            .map(|obj| {
                obj.entry("recent_feedback")
                    .or_insert_with(|| json!([]))
            })
            .and_then(|v| v.as_array_mut());
        if let Some(recent) = recent {
            for record in &consumed {
                recent.push(record.payload.clone());
            }
            while recent.len() > RECENT_FEEDBACK_CAP {
                recent.remove(0);
            }
        }
    }
    fs::write(
        ws.context_file(),
        serde_json::to_string_pretty(&context)?,
    )?;

    let mut rewritten = survivors.join("\n");
    if !rewritten.is_empty() {
        rewritten.push('\n');
    }
    fs::write(&live_path, rewritten)
        .with_context(|| format!("Failed to rewrite {}", live_path.display()))?;

    Ok(consumed.len())
}
