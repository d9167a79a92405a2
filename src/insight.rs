//! Insight history and the self-improve pass: fresh reflection insights are
//! deduplicated against everything ever queued (exact text match), survivors
//! become patch tasks, and the history file is rewritten as the union so a
//! replayed insight can never queue twice.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::index::FileIndex;
use crate::queue::PatchTask;

lazy_static! {
    static ref BACKTICKED_FILE: Regex = Regex::new(r"`([^`]+\.\w{1,10})`").unwrap();
}

/// Single JSON array of previously-queued insight strings. Missing or
/// unparsable history degrades to empty — never an error.
pub fn load_history(path: &Path) -> BTreeSet<String> {
    let Ok(raw) = fs::read_to_string(path) else {
        return BTreeSet::new();
    };
    serde_json::from_str::<Vec<String>>(&raw)
        .map(|v| v.into_iter().collect())
        .unwrap_or_default()
}

/// Wholesale rewrite (union, not append). BTreeSet keeps the file stable
/// under replay.
pub fn save_history(path: &Path, history: &BTreeSet<String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let entries: Vec<&String> = history.iter().collect();
    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Pick the task target out of one insight: a backticked filename resolved
/// against the index, else the configured default target.
fn target_for(insight: &str, index: &FileIndex, default_target: &str) -> String {
    let named = BACKTICKED_FILE
        .captures(insight)
        .map(|caps| caps[1].to_string());
    match named {
        Some(name) => index.resolve(&name).unwrap_or(&name).to_string(),
        None => index
            .resolve(default_target)
            .unwrap_or(default_target)
            .to_string(),
    }
}

/// Queue every not-yet-seen insight as a patch task. Returns the report
/// shown to the user.
pub fn queue_new_insights(
    insights: &[String],
    index: &FileIndex,
    default_target: &str,
    history_path: &Path,
    mut enqueue: impl FnMut(PatchTask),
) -> Result<String> {
    let stripped: Vec<String> = insights
        .iter()
        .map(|line| line.trim().trim_start_matches("- ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if stripped.is_empty() {
        return Ok("No actionable insights to queue.".to_string());
    }

    let mut history = load_history(history_path);
    let fresh: Vec<&String> = stripped
        .iter()
        .filter(|i| !history.contains(i.as_str()))
        .collect();
    if fresh.is_empty() {
        return Ok("All self-improvement suggestions have already been queued.".to_string());
    }

    let mut report = vec!["Queued new self-improvement tasks:".to_string()];
    for insight in fresh {
        let target = target_for(insight, index, default_target);
        enqueue(PatchTask {
            path: target.clone(),
            description: insight.clone(),
        });
        report.push(format!("- [{target}] {insight}"));
        history.insert(insight.clone());
    }
    save_history(history_path, &history)?;
    Ok(report.join("\n"))
}
