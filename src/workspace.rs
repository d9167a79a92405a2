use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const PILOT_DIR: &str = ".patchpilot";

const DEFAULT_CONFIG: &str = r##"# patchpilot configuration
# Every key is optional; absent keys keep their built-in defaults.

[generation]
# Ollama-compatible endpoint, plain HTTP.
host = "127.0.0.1:11434"
model = "llama3.2"
timeout_ms = 30000
# Retry once with web snippets when the reply sounds uncertain.
uncertainty_retry = true

[search]
enabled = false
host = "127.0.0.1:8080"
timeout_ms = 10000

[access]
# Extensions (no dot) the safe updater refuses to overwrite.
restricted_extensions = ["yaml", "yml", "toml", "lock"]

[modes]
patch_approval = true
approval_timeout_secs = 120
# "static" or "llm"
reflect_strategy = "static"

[reflect]
# Patch target when an insight names no file.
default_target = "src/main.rs"
complexity_threshold = 8
"##;

/// All agent state lives under `<project>/.patchpilot/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(project_root: &Path) -> Self {
        Self {
            root: project_root.join(PILOT_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn patch_notes_dir(&self) -> PathBuf {
        self.root.join("patch_notes")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("logs.jsonl")
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.root.join("feedback.jsonl")
    }

    pub fn feedback_archive(&self) -> PathBuf {
        self.root.join("feedback_archive.jsonl")
    }

    pub fn context_file(&self) -> PathBuf {
        self.root.join("context.json")
    }

    pub fn insight_history(&self) -> PathBuf {
        self.root.join("insight_history.json")
    }

    /// Create the state directories. Cheap and idempotent; called on every run.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.patch_notes_dir())
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        Ok(())
    }
}

/// `patchpilot init` — seed the workspace with a commented default config.
pub fn run_init(project_root: &Path, verbose: u8) -> Result<()> {
    let ws = Workspace::new(project_root);
    ws.ensure()?;

    let config = ws.config_file();
    if config.exists() {
        println!("patchpilot already initialized at {}", ws.dir().display());
        return Ok(());
    }
    fs::write(&config, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config.display()))?;

    if verbose > 0 {
        eprintln!("[init] wrote {}", config.display());
    }
    println!("Initialized {}", ws.dir().display());
    Ok(())
}
