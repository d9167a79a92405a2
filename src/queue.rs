//! Patch queue and its single background worker. Producers never block
//! (unbounded channel); the worker blocks on recv and drains serially so
//! two patches can never race on one file. An explicit shutdown message
//! plays the sentinel role; `stop()` guarantees queued tasks finish first.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::generation::GenerationClient;
use crate::proposer::Proposer;
use crate::search::SearchProvider;
use crate::updater::{ApprovalGate, SafeUpdater};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTask {
    /// Index-relative target path.
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub path: String,
    pub description: String,
    /// Human-readable outcome ("applied", "rejected", "abandoned", ...).
    /// Completion never implies application.
    pub outcome: String,
}

enum WorkerMsg {
    Task(PatchTask),
    Shutdown,
}

/// Everything the worker thread owns. Built once at startup; no globals.
pub struct WorkerContext {
    pub project_root: PathBuf,
    pub notes_dir: PathBuf,
    pub config: Arc<Config>,
    pub client: Box<dyn GenerationClient>,
    pub search: Box<dyn SearchProvider>,
    pub gate: Box<dyn ApprovalGate>,
    pub verbose: u8,
}

pub struct Worker {
    tx: Sender<WorkerMsg>,
    handle: Option<JoinHandle<()>>,
    completed: Arc<Mutex<Vec<CompletedTask>>>,
}

impl Worker {
    pub fn start(ctx: WorkerContext) -> Self {
        let (tx, rx) = channel::<WorkerMsg>();
        let completed: Arc<Mutex<Vec<CompletedTask>>> = Arc::new(Mutex::new(Vec::new()));
        let completed_writer = Arc::clone(&completed);

        let handle = thread::spawn(move || {
            let proposer = Proposer::new(
                ctx.client.as_ref(),
                ctx.search.as_ref(),
                ctx.notes_dir.clone(),
                ctx.config.generation.uncertainty_retry,
                ctx.verbose,
            );
            let updater = SafeUpdater::new(
                &ctx.config,
                ctx.notes_dir.clone(),
                ctx.gate.as_ref(),
                ctx.verbose,
            );

            // Blocking pop; loop ends on Shutdown or when all senders drop.
            while let Ok(WorkerMsg::Task(task)) = rx.recv() {
                let outcome = run_task(&ctx.project_root, &proposer, &updater, &task);
                if ctx.verbose > 0 {
                    eprintln!("[worker] {} -> {}", task.path, outcome);
                }
                if let Ok(mut list) = completed_writer.lock() {
                    list.push(CompletedTask {
                        path: task.path,
                        description: task.description,
                        outcome,
                    });
                }
            }
        });

        Self {
            tx,
            handle: Some(handle),
            completed,
        }
    }

    /// Non-blocking push; a task sent after shutdown is silently dropped
    /// (the process is exiting anyway).
    pub fn enqueue(&self, task: PatchTask) {
        let _ = self.tx.send(WorkerMsg::Task(task));
    }

    /// Snapshot for pollers. The worker is the only writer.
    pub fn completed(&self) -> Vec<CompletedTask> {
        self.completed
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Send the sentinel and join. Every task enqueued before this call
    /// completes before the thread exits.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(WorkerMsg::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One task, start to finish. Failures are logged and folded into the
/// outcome string; nothing here may take the worker down.
fn run_task(
    project_root: &Path,
    proposer: &Proposer<'_>,
    updater: &SafeUpdater<'_>,
    task: &PatchTask,
) -> String {
    let target = if Path::new(&task.path).is_absolute() {
        PathBuf::from(&task.path)
    } else {
        project_root.join(&task.path)
    };

    let proposal = match proposer.propose(&target, &task.description) {
        Ok(Some(p)) => p,
        Ok(None) => return "abandoned".to_string(),
        Err(err) => {
            eprintln!("[worker] proposal error for {}: {err}", task.path);
            return "failed".to_string();
        }
    };

    match updater.apply(&target, &proposal.candidate) {
        Ok(outcome) => {
            if outcome == crate::updater::ApplyOutcome::Rejected {
                println!("Candidate kept at {}", proposal.note.display());
            }
            outcome.to_string()
        }
        Err(err) => {
            eprintln!("[worker] apply error for {}: {err}", task.path);
            "failed".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenError;
    use crate::search::NullSearch;
    use crate::updater::AutoGate;
    use std::fs;

    struct Fixed(&'static str);
    impl GenerationClient for Fixed {
        fn generate(&self, _prompt: &str) -> Result<String, GenError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;
    impl GenerationClient for Failing {
        fn generate(&self, _prompt: &str) -> Result<String, GenError> {
            Err(GenError::Transport("connection refused".into()))
        }
    }

    fn context(root: &Path, client: Box<dyn GenerationClient>) -> WorkerContext {
        let mut config = Config::default();
        config.modes.patch_approval = false;
        WorkerContext {
            project_root: root.to_path_buf(),
            notes_dir: root.join(".notes"),
            config: Arc::new(config),
            client,
            search: Box::new(NullSearch),
            gate: Box::new(AutoGate(true)),
            verbose: 0,
        }
    }

    #[test]
    fn queue_drains_before_shutdown_and_loses_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.py", "b.py", "c.py"] {
            fs::write(tmp.path().join(name), "old\n").unwrap();
        }
        let mut worker = Worker::start(context(tmp.path(), Box::new(Fixed("```\nnew\n```"))));
        for name in ["a.py", "b.py", "c.py"] {
            worker.enqueue(PatchTask {
                path: name.to_string(),
                description: format!("rewrite {name}"),
            });
        }
        worker.stop();

        let done = worker.completed();
        assert_eq!(done.len(), 3);
        let mut paths: Vec<_> = done.iter().map(|t| t.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);
        for t in &done {
            assert_eq!(t.outcome, "applied");
        }
        assert_eq!(fs::read_to_string(tmp.path().join("a.py")).unwrap(), "new");
    }

    #[test]
    fn failed_generation_still_completes_the_task() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "old\n").unwrap();
        let mut worker = Worker::start(context(tmp.path(), Box::new(Failing)));
        worker.enqueue(PatchTask {
            path: "a.py".to_string(),
            description: "doomed".to_string(),
        });
        worker.enqueue(PatchTask {
            path: "missing.py".to_string(),
            description: "also doomed".to_string(),
        });
        worker.stop();

        let done = worker.completed();
        assert_eq!(done.len(), 2);
        assert!(done.iter().all(|t| t.outcome == "abandoned"));
        // queue never stalled, file never touched
        assert_eq!(fs::read_to_string(tmp.path().join("a.py")).unwrap(), "old\n");
    }

    #[test]
    fn completed_list_is_readable_while_running() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = Worker::start(context(tmp.path(), Box::new(Fixed("x"))));
        assert!(worker.completed().is_empty());
    }
}
