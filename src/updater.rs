//! Gate between proposed content and the working tree. Every transition
//! except `Unchanged` leaves a patch note behind; `Applied` is the only
//! outcome that mutates a file.

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use similar::TextDiff;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Blocked,
    Rejected,
    Unchanged,
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Blocked => "blocked",
            Self::Rejected => "rejected",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

/// Human decision point. Implementations must not panic; silence is a "no".
pub trait ApprovalGate: Send {
    fn approve(&self, path: &Path, note: &Path) -> bool;
}

/// Fixed answer — approval mode disabled, and tests.
pub struct AutoGate(pub bool);

impl ApprovalGate for AutoGate {
    fn approve(&self, _path: &Path, _note: &Path) -> bool {
        self.0
    }
}

/// y/n prompt on stdin with a timeout; no answer within the window rejects.
/// One long-lived reader thread feeds a channel so repeated prompts never
/// compete for stdin.
pub struct StdinGate {
    lines: Mutex<Receiver<String>>,
    timeout: Duration,
}

impl StdinGate {
    pub fn new(timeout_secs: u64) -> Self {
        let (tx, rx) = channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl ApprovalGate for StdinGate {
    fn approve(&self, path: &Path, note: &Path) -> bool {
        println!("{} {}", "Patch note:".bold(), note.display());
        print!("Approve changes to {}? (y/n): ", path.display());
        let _ = std::io::stdout().flush();
        let rx = match self.lines.lock() {
            Ok(rx) => rx,
            Err(_) => return false,
        };
        match rx.recv_timeout(self.timeout) {
            Ok(answer) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => {
                println!("\n{}", "No answer — treating as reject.".yellow());
                false
            }
        }
    }
}

/// Approval routed to whoever owns the terminal (the chat REPL). The
/// worker blocks on the reply with the same timeout-rejects contract.
pub struct ApprovalRequest {
    pub path: PathBuf,
    pub note: PathBuf,
    pub reply: std::sync::mpsc::Sender<bool>,
}

pub struct ChannelGate {
    tx: std::sync::mpsc::Sender<ApprovalRequest>,
    timeout: Duration,
}

impl ChannelGate {
    pub fn new(tx: std::sync::mpsc::Sender<ApprovalRequest>, timeout_secs: u64) -> Self {
        Self {
            tx,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl ApprovalGate for ChannelGate {
    fn approve(&self, path: &Path, note: &Path) -> bool {
        let (reply_tx, reply_rx) = channel();
        let request = ApprovalRequest {
            path: path.to_path_buf(),
            note: note.to_path_buf(),
            reply: reply_tx,
        };
        if self.tx.send(request).is_err() {
            return false;
        }
        reply_rx.recv_timeout(self.timeout).unwrap_or(false)
    }
}

/// Write one append-only patch note. Dots in the basename become
/// underscores; a counter disambiguates same-second notes for one file.
pub fn write_patch_note(notes_dir: &Path, target: &Path, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(notes_dir)
        .with_context(|| format!("Failed to create {}", notes_dir.display()))?;
    let base = target
        .file_name()
        .map(|n| n.to_string_lossy().replace('.', "_"))
        .unwrap_or_else(|| "unnamed".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut note = notes_dir.join(format!("{base}_{stamp}.patch"));
    let mut counter = 1u32;
    while note.exists() {
        note = notes_dir.join(format!("{base}_{stamp}_{counter}.patch"));
        counter += 1;
    }
    fs::write(&note, content).with_context(|| format!("Failed to write {}", note.display()))?;
    Ok(note)
}

pub struct SafeUpdater<'a> {
    config: &'a Config,
    notes_dir: PathBuf,
    gate: &'a dyn ApprovalGate,
    verbose: u8,
}

impl<'a> SafeUpdater<'a> {
    pub fn new(
        config: &'a Config,
        notes_dir: PathBuf,
        gate: &'a dyn ApprovalGate,
        verbose: u8,
    ) -> Self {
        Self {
            config,
            notes_dir,
            gate,
            verbose,
        }
    }

    /// Decision order: restricted extension, unchanged content, diff note,
    /// approval, write. Idempotent: re-applying identical content reports
    /// `Unchanged` and touches nothing.
    pub fn apply(&self, path: &Path, new_content: &str) -> Result<ApplyOutcome> {
        if self.config.extension_restricted(path) {
            println!("{} {}", "Write blocked (restricted extension):".red(), path.display());
            return Ok(ApplyOutcome::Blocked);
        }

        let old_content = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };

        if old_content.trim() == new_content.trim() {
            if self.verbose > 0 {
                eprintln!("[updater] no change needed: {}", path.display());
            }
            return Ok(ApplyOutcome::Unchanged);
        }

        let display = path.display().to_string();
        let text_diff = TextDiff::from_lines(old_content.as_str(), new_content);
        let diff = text_diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("{display} (old)"), &format!("{display} (new)"))
            .to_string();
        let note = write_patch_note(&self.notes_dir, path, &diff)?;
        println!("{} {}", "Patch note saved:".green(), note.display());

        if self.config.modes.patch_approval && !self.gate.approve(path, &note) {
            println!("{}", "Patch rejected.".red());
            return Ok(ApplyOutcome::Rejected);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, new_content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} {}", "File updated:".green(), path.display());
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approving_config() -> Config {
        let mut cfg = Config::default();
        cfg.modes.patch_approval = false;
        cfg
    }

    fn note_count(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn restricted_extension_blocks_without_note() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("config.yaml");
        fs::write(&target, "a: 1\n").unwrap();
        let notes = tmp.path().join("notes");
        let cfg = approving_config();
        let gate = AutoGate(true);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        let outcome = updater.apply(&target, "a: 2\n").unwrap();
        assert_eq!(outcome, ApplyOutcome::Blocked);
        assert_eq!(fs::read_to_string(&target).unwrap(), "a: 1\n");
        assert_eq!(note_count(&notes), 0);
    }

    #[test]
    fn identical_content_is_unchanged_and_noteless() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("main.py");
        fs::write(&target, "print('hi')\n").unwrap();
        let notes = tmp.path().join("notes");
        let cfg = approving_config();
        let gate = AutoGate(true);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        // trailing whitespace differences count as identical
        let outcome = updater.apply(&target, "print('hi')").unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(note_count(&notes), 0);
    }

    #[test]
    fn apply_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("main.py");
        fs::write(&target, "old\n").unwrap();
        let notes = tmp.path().join("notes");
        let cfg = approving_config();
        let gate = AutoGate(true);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        assert_eq!(updater.apply(&target, "new\n").unwrap(), ApplyOutcome::Applied);
        assert_eq!(updater.apply(&target, "new\n").unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(note_count(&notes), 1);
    }

    #[test]
    fn applied_write_leaves_exactly_one_diff_note() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("mod.py");
        fs::write(&target, "a\nb\nc\n").unwrap();
        let notes = tmp.path().join("notes");
        let cfg = approving_config();
        let gate = AutoGate(true);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        updater.apply(&target, "a\nB\nc\n").unwrap();
        let entries: Vec<_> = fs::read_dir(&notes).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        let diff = fs::read_to_string(entries[0].path()).unwrap();
        assert!(diff.contains("(old)"));
        assert!(diff.contains("(new)"));
        assert!(diff.contains("-b"));
        assert!(diff.contains("+B"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "a\nB\nc\n");
    }

    #[test]
    fn rejection_keeps_file_but_keeps_note() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("main.py");
        fs::write(&target, "old\n").unwrap();
        let notes = tmp.path().join("notes");
        let cfg = Config::default(); // approval on
        let gate = AutoGate(false);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        assert_eq!(updater.apply(&target, "new\n").unwrap(), ApplyOutcome::Rejected);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old\n");
        assert_eq!(note_count(&notes), 1);
    }

    #[test]
    fn missing_file_is_created_from_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("fresh.py");
        let notes = tmp.path().join("notes");
        let cfg = approving_config();
        let gate = AutoGate(true);
        let updater = SafeUpdater::new(&cfg, notes.clone(), &gate, 0);

        assert_eq!(updater.apply(&target, "hello\n").unwrap(), ApplyOutcome::Applied);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello\n");
    }

    #[test]
    fn channel_gate_silence_rejects() {
        let (tx, _rx) = channel::<ApprovalRequest>();
        let gate = ChannelGate::new(tx, 0);
        assert!(!gate.approve(Path::new("a.py"), Path::new("note.patch")));
    }

    #[test]
    fn channel_gate_relays_the_answer() {
        let (tx, rx) = channel::<ApprovalRequest>();
        let answerer = thread::spawn(move || {
            let req = rx.recv().unwrap();
            req.reply.send(true).unwrap();
        });
        let gate = ChannelGate::new(tx, 5);
        assert!(gate.approve(Path::new("a.py"), Path::new("note.patch")));
        answerer.join().unwrap();
    }

    #[test]
    fn same_second_notes_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("x.py");
        let a = write_patch_note(tmp.path(), &target, "one").unwrap();
        let b = write_patch_note(tmp.path(), &target, "two").unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(a).unwrap(), "one");
        assert_eq!(fs::read_to_string(b).unwrap(), "two");
    }
}
