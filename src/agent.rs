//! The orchestrator: one `Agent` instance owns the index, classifier,
//! generation client, and worker handle — no ambient globals. Each user
//! turn is classified and dispatched; patch work goes through the queue,
//! everything else answers inline.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::generation::{self, GenerationClient, OllamaClient};
use crate::index::FileIndex;
use crate::insight;
use crate::intent::{self, Classifier, Command, CommandKind, KeywordClassifier};
use crate::journal;
use crate::persona;
use crate::queue::{CompletedTask, PatchTask, Worker, WorkerContext};
use crate::reflect::{self, ReflectStrategy};
use crate::search::{HtmlSearch, NullSearch, SearchProvider};
use crate::updater::ApprovalGate;
use crate::workspace::Workspace;

lazy_static! {
    static ref RAW_FILE_TOKEN: Regex = Regex::new(r"\b[\w/.-]+\.\w{1,10}\b").unwrap();
}

const CREATE_PLACEHOLDER: &str = "# created by patchpilot\n";

pub struct Agent {
    project_root: PathBuf,
    config: Arc<Config>,
    workspace: Workspace,
    index: FileIndex,
    classifier: Box<dyn Classifier>,
    client: Box<dyn GenerationClient>,
    search: Box<dyn SearchProvider>,
    worker: Worker,
    verbose: u8,
}

fn make_search(config: &Config, verbose: u8) -> Box<dyn SearchProvider> {
    if config.search.enabled {
        Box::new(HtmlSearch::new(&config.search, verbose))
    } else {
        Box::new(NullSearch)
    }
}

impl Agent {
    /// Build the whole pipeline and start the background worker. The gate
    /// decides how the worker asks for approval; callers pick a stdin gate,
    /// a channel gate, or an auto gate depending on who owns the terminal.
    pub fn start(
        project_root: &Path,
        config: Config,
        gate: Box<dyn ApprovalGate>,
        verbose: u8,
    ) -> Result<Self> {
        let workspace = Workspace::new(project_root);
        workspace.ensure()?;
        let config = Arc::new(config);

        let worker = Worker::start(WorkerContext {
            project_root: project_root.to_path_buf(),
            notes_dir: workspace.patch_notes_dir(),
            config: Arc::clone(&config),
            client: Box::new(OllamaClient::new(&config.generation)),
            search: make_search(&config, verbose),
            gate,
            verbose,
        });

        Ok(Self {
            project_root: project_root.to_path_buf(),
            index: FileIndex::new(project_root),
            classifier: Box::new(KeywordClassifier),
            client: Box::new(OllamaClient::new(&config.generation)),
            search: make_search(&config, verbose),
            workspace,
            config,
            worker,
            verbose,
        })
    }

    /// One user turn: reindex, classify, dispatch.
    pub fn handle_input(&mut self, text: &str) -> Result<String> {
        let text = text.trim();
        self.index.rebuild()?;
        let command = self.classifier.classify(text, &self.index);
        if self.verbose > 0 {
            eprintln!(
                "[agent] intent={} targets={:?}",
                command.kind, command.filenames
            );
        }

        match command.kind {
            CommandKind::Locate => Ok(self.locate(&command)),
            CommandKind::Patch => Ok(self.queue_patch(&command)),
            CommandKind::Create => self.create_file(text),
            CommandKind::Rename => Ok(
                "Rename is not supported; move the file yourself and re-index.".to_string(),
            ),
            CommandKind::Reflect => {
                let insights = self.reflect()?;
                Ok(reflect::render_report(&insights))
            }
            CommandKind::Improve => self.improve(),
            CommandKind::Feature => Ok(
                "Feature request noted. Say `implement feature <description>` when ready."
                    .to_string(),
            ),
            CommandKind::Chat => self.chat_or_traceback(text),
        }
    }

    fn locate(&self, command: &Command) -> String {
        if command.filenames.is_empty() {
            return "No matching file in the index.".to_string();
        }
        command
            .filenames
            .iter()
            .map(|p| format!("Found: {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn queue_patch(&self, command: &Command) -> String {
        // An empty target list is valid — report, don't error.
        let Some(target) = command.filenames.first() else {
            return "No target file found in that request.".to_string();
        };
        self.worker.enqueue(PatchTask {
            path: target.clone(),
            description: command.task.clone(),
        });
        format!("Queued patch for {target}")
    }

    /// Creating a placeholder needs no generation round-trip, so it skips
    /// the queue; the extension policy and the note ledger still apply.
    fn create_file(&mut self, text: &str) -> Result<String> {
        let Some(name) = RAW_FILE_TOKEN.find(text).map(|m| m.as_str().to_string()) else {
            return Ok("Tell me the filename to create (with extension).".to_string());
        };
        let target = self.project_root.join(&name);
        if self.config.extension_restricted(&target) {
            return Ok(format!("Write blocked (restricted extension): {name}"));
        }
        if target.exists() {
            return Ok(format!("{name} already exists."));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, CREATE_PLACEHOLDER)?;
        crate::updater::write_patch_note(
            &self.workspace.patch_notes_dir(),
            &target,
            CREATE_PLACEHOLDER,
        )?;
        Ok(format!("Created {name}"))
    }

    pub fn reflect(&mut self) -> Result<Vec<String>> {
        self.index.rebuild()?;
        let strategy = ReflectStrategy::parse(&self.config.modes.reflect_strategy);
        reflect::run(
            &self.index,
            strategy,
            &self.config.reflect,
            self.client.as_ref(),
            self.search.as_ref(),
        )
    }

    /// Self-improve: fresh insights, dedup against history, queue survivors.
    pub fn improve(&mut self) -> Result<String> {
        let insights = self.reflect()?;
        let worker = &self.worker;
        insight::queue_new_insights(
            &insights,
            &self.index,
            &self.config.reflect.default_target,
            &self.workspace.insight_history(),
            |task| worker.enqueue(task),
        )
    }

    fn chat_or_traceback(&mut self, text: &str) -> Result<String> {
        if let Some((file, desc)) = intent::detect_traceback(text) {
            let basename = Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or(file.clone());
            let target = self
                .index
                .resolve(&basename)
                .unwrap_or(file.as_str())
                .to_string();
            self.worker.enqueue(PatchTask {
                path: target.clone(),
                description: desc,
            });
            return Ok(format!("Proposed patch for error in {target}"));
        }

        let prompt = persona::chat_prompt(
            &self.project_root.display().to_string(),
            &journal::context_for_prompt(&self.workspace),
            &self.index.folder_overview(),
            &self.index.file_overview(),
            text,
        );
        let reply = match generation::ask(
            self.client.as_ref(),
            self.search.as_ref(),
            &prompt,
            self.config.generation.uncertainty_retry,
        ) {
            Ok(reply) => reply,
            Err(err) => {
                eprintln!("[agent] chat generation failed: {err}");
                "I couldn't reach the generation service.".to_string()
            }
        };
        journal::log_interaction(&self.workspace, text, &reply)?;
        Ok(reply)
    }

    pub fn completed(&self) -> Vec<CompletedTask> {
        self.worker.completed()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Drain the queue and join the worker. Nothing enqueued before this
    /// call is dropped.
    pub fn shutdown(mut self) -> Vec<CompletedTask> {
        self.worker.stop();
        self.worker.completed()
    }
}
