mod agent;
mod config;
mod generation;
mod http;
mod index;
mod insight;
mod intent;
mod journal;
mod persona;
mod proposer;
mod queue;
mod reflect;
mod search;
mod updater;
mod workspace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use agent::Agent;
use config::Config;
use updater::{ApprovalGate, ApprovalRequest, AutoGate, ChannelGate, StdinGate};
use workspace::Workspace;

#[derive(Parser)]
#[command(
    name = "patchpilot",
    version,
    about = "Local agent that turns natural-language requests into reviewed file patches",
    long_about = "Patchpilot indexes a project tree, classifies what you ask for, drafts file \
changes through a local generation service, and applies them only after review. Every attempt \
leaves a patch note behind."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .patchpilot/ with a commented default config
    Init,

    /// Interactive session; patches are reviewed inline
    Chat,

    /// One-shot request, then drain the queue and exit
    Ask {
        /// The request, in natural language
        text: Vec<String>,
    },

    /// Rebuild the file index and print it
    Index,

    /// Resolve a filename suffix against the index
    Locate {
        /// e.g. "app.py" or "handlers/login.py"
        suffix: String,
    },

    /// Print self-reflection insights without queueing anything
    Reflect {
        /// Override the configured strategy: static or llm
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Reflect, dedup against history, queue new insights, drain the queue
    Improve,

    /// One feedback-learning pass over the feedback file
    Feedback,

    /// Show recent patch notes
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.canonicalize().unwrap_or(cli.root.clone());

    match cli.command {
        Commands::Init => workspace::run_init(&root, cli.verbose)?,
        Commands::Chat => run_chat(&root, cli.verbose)?,
        Commands::Ask { text } => run_ask(&root, &text.join(" "), cli.verbose)?,
        Commands::Index => run_index(&root)?,
        Commands::Locate { suffix } => run_locate(&root, &suffix)?,
        Commands::Reflect { strategy } => run_reflect(&root, strategy, cli.verbose)?,
        Commands::Improve => run_improve(&root, cli.verbose)?,
        Commands::Feedback => {
            let ws = Workspace::new(&root);
            ws.ensure()?;
            let consumed = journal::feedback_pass(&ws, cli.verbose)?;
            println!("Consumed {consumed} feedback record(s).");
        }
        Commands::Status => run_status(&root)?,
    }
    Ok(())
}

fn load_config(root: &Path) -> Result<Config> {
    let ws = Workspace::new(root);
    Config::load(&ws.config_file())
}

fn spawn_line_reader() -> Receiver<String> {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::BufRead::read_line(&mut stdin.lock(), &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn answer_approval(req: ApprovalRequest, lines: &Receiver<String>, timeout: Duration) {
    println!("{} {}", "Patch note:".bold(), req.note.display());
    print!("Approve changes to {}? (y/n): ", req.path.display());
    let _ = std::io::stdout().flush();
    let approved = lines
        .recv_timeout(timeout)
        .map(|l| l.trim().eq_ignore_ascii_case("y"))
        .unwrap_or(false);
    if !approved {
        println!("{}", "Rejected.".yellow());
    }
    let _ = req.reply.send(approved);
}

fn run_chat(root: &Path, verbose: u8) -> Result<()> {
    let config = load_config(root)?;
    let approval_timeout = Duration::from_secs(config.modes.approval_timeout_secs);

    let (approval_tx, approval_rx) = channel::<ApprovalRequest>();
    let gate: Box<dyn ApprovalGate> = if config.modes.patch_approval {
        Box::new(ChannelGate::new(
            approval_tx,
            config.modes.approval_timeout_secs,
        ))
    } else {
        Box::new(AutoGate(true))
    };

    let mut agent = Agent::start(root, config, gate, verbose)?;
    let lines = spawn_line_reader();
    println!("patchpilot ready - type a request, or 'exit' to quit.");

    'session: loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = loop {
            // pending approvals get the next typed line
            if let Ok(req) = approval_rx.try_recv() {
                answer_approval(req, &lines, approval_timeout);
                print!("> ");
                let _ = std::io::stdout().flush();
                continue;
            }
            match lines.recv_timeout(Duration::from_millis(200)) {
                Ok(line) => break line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break 'session,
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match agent.handle_input(line) {
            Ok(reply) => println!("{reply}"),
            Err(err) => eprintln!("{} {err:#}", "error:".red()),
        }
    }

    let done = agent.shutdown();
    if !done.is_empty() {
        println!("{}", "Completed tasks:".bold());
        for task in done {
            println!("  [{}] {}: {}", task.outcome, task.path, task.description);
        }
    }
    Ok(())
}

fn run_ask(root: &Path, text: &str, verbose: u8) -> Result<()> {
    let config = load_config(root)?;
    let gate: Box<dyn ApprovalGate> = if config.modes.patch_approval {
        Box::new(StdinGate::new(config.modes.approval_timeout_secs))
    } else {
        Box::new(AutoGate(true))
    };
    let mut agent = Agent::start(root, config, gate, verbose)?;
    let reply = agent.handle_input(text)?;
    println!("{reply}");
    for task in agent.shutdown() {
        println!("  [{}] {}: {}", task.outcome, task.path, task.description);
    }
    Ok(())
}

fn run_index(root: &Path) -> Result<()> {
    let mut index = index::FileIndex::new(root);
    index.rebuild()?;
    for path in index.files() {
        println!("{path}");
    }
    println!("{} file(s) indexed.", index.len());
    Ok(())
}

fn run_locate(root: &Path, suffix: &str) -> Result<()> {
    let mut index = index::FileIndex::new(root);
    index.rebuild()?;
    match index.resolve(suffix) {
        Some(path) => println!("{path}"),
        None => {
            println!("not found");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_reflect(root: &Path, strategy: Option<String>, verbose: u8) -> Result<()> {
    let mut config = load_config(root)?;
    if let Some(strategy) = strategy {
        config.modes.reflect_strategy = strategy;
    }
    let mut agent = Agent::start(root, config, Box::new(AutoGate(false)), verbose)?;
    let insights = agent.reflect()?;
    println!("{}", reflect::render_report(&insights));
    agent.shutdown();
    Ok(())
}

fn run_improve(root: &Path, verbose: u8) -> Result<()> {
    let config = load_config(root)?;
    let gate: Box<dyn ApprovalGate> = if config.modes.patch_approval {
        Box::new(StdinGate::new(config.modes.approval_timeout_secs))
    } else {
        Box::new(AutoGate(true))
    };
    let mut agent = Agent::start(root, config, gate, verbose)?;
    let report = agent.improve()?;
    println!("{report}");
    for task in agent.shutdown() {
        println!("  [{}] {}: {}", task.outcome, task.path, task.description);
    }
    Ok(())
}

fn run_status(root: &Path) -> Result<()> {
    let ws = Workspace::new(root);
    let notes_dir = ws.patch_notes_dir();
    if !notes_dir.exists() {
        println!("No patch notes yet.");
        return Ok(());
    }
    let mut notes: Vec<String> = std::fs::read_dir(&notes_dir)?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    notes.sort_unstable();
    let total = notes.len();
    for note in notes.iter().rev().take(10) {
        println!("{note}");
    }
    println!("{total} patch note(s) in {}", notes_dir.display());
    Ok(())
}
