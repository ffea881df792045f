//! Task execution orchestrator CLI.
//!
//! Manages a task file (`.taskpilot/tasks.json`) and dispatches approved tasks
//! to external coding agents, one observe/orient/decide/act cycle at a time.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use taskpilot::agents::{ExecutorEnv, ExecutorRegistry};
use taskpilot::core::types::Provider;
use taskpilot::engine::{
    ActReport, CycleOutcome, Engine, EngineOptions, ProviderSelector, SelectionPolicy,
};
use taskpilot::error::OrchestratorError;
use taskpilot::events::{Event, EventBus, Subscription, Topic};
use taskpilot::exit_codes;
use taskpilot::io::init::{InitOptions, WorkspacePaths, init_workspace};
use taskpilot::io::task_store::{JsonTaskStore, TaskRepository};
use taskpilot::logging;
use taskpilot::looping::{LoopStop, run_loop};
use taskpilot::task::{NewTask, TaskPatch};

#[derive(Parser)]
#[command(
    name = "taskpilot",
    version,
    about = "Dispatch approved tasks to external AI coding agents"
)]
struct Cli {
    /// Project root containing `.taskpilot/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskpilot/` with a default config and an empty task file.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Add a task to the task file.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// 0 (low) to 3 (urgent).
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
        priority: u8,
        /// Affected file (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,
        /// Mark the task approved for execution right away.
        #[arg(long)]
        approve: bool,
    },
    /// Approve a pending task for execution.
    Approve { id: String },
    /// Show queue counts and the next task that would run.
    Observe,
    /// List registered providers and whether they are available.
    Providers,
    /// Run one cycle: pick the next approved task and execute it.
    Run {
        /// Skip provider selection and use this provider.
        #[arg(long, conflicts_with = "interactive")]
        provider: Option<Provider>,
        /// Ask which available provider to use.
        #[arg(long)]
        interactive: bool,
    },
    /// Run cycles until the queue is idle or no agent is available.
    Loop {
        #[arg(long)]
        max_cycles: Option<u32>,
    },
    /// Print task counts per status.
    Stats,
    /// Print the most recently completed tasks.
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = WorkspacePaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Add {
            title,
            description,
            category,
            priority,
            files,
            approve,
        } => cmd_add(
            &paths,
            NewTask {
                title,
                description,
                category,
                priority,
                affected_files: files,
                dependencies: Vec::new(),
                human_approved: approve,
            },
        ),
        Command::Approve { id } => cmd_approve(&paths, &id),
        Command::Observe => cmd_observe(&paths),
        Command::Providers => cmd_providers(&paths),
        Command::Run {
            provider,
            interactive,
        } => cmd_run(&paths, provider, interactive),
        Command::Loop { max_cycles } => cmd_loop(&paths, max_cycles),
        Command::Stats => cmd_stats(&paths),
        Command::Recent { limit } => cmd_recent(&paths, limit),
    }
}

fn cmd_init(paths: &WorkspacePaths, force: bool) -> Result<i32> {
    let paths = init_workspace(&paths.root, &InitOptions { force })?;
    println!("initialized {}", paths.state_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_add(paths: &WorkspacePaths, input: NewTask) -> Result<i32> {
    if input.title.trim().is_empty() {
        return Err(anyhow!("task title must not be empty"));
    }
    let task = JsonTaskStore::new(&paths.tasks_path).create(input)?;
    println!("{}", task.id);
    Ok(exit_codes::OK)
}

fn cmd_approve(paths: &WorkspacePaths, id: &str) -> Result<i32> {
    let store = JsonTaskStore::new(&paths.tasks_path);
    if store.get(id)?.is_none() {
        return Err(OrchestratorError::TaskNotFound(id.to_string()).into());
    }
    store.update(
        id,
        &TaskPatch {
            human_approved: Some(true),
            ..TaskPatch::default()
        },
    )?;
    println!("approved {id}");
    Ok(exit_codes::OK)
}

fn cmd_observe(paths: &WorkspacePaths) -> Result<i32> {
    let engine = build_engine(paths, None)?;
    let obs = engine.observe()?;
    println!(
        "pending: {}  completed: {}  needs review: {}",
        obs.pending_count, obs.completed_count, obs.review_count
    );
    match obs.next_task {
        Some(task) => {
            let assessment = engine.orient(&task);
            println!(
                "next: {} [{}] {} (criticality {:.2})",
                task.id,
                task.priority_label(),
                task.title,
                assessment.overall_criticality
            );
        }
        None => println!("next: none"),
    }
    Ok(exit_codes::OK)
}

fn cmd_providers(paths: &WorkspacePaths) -> Result<i32> {
    let engine = build_engine(paths, None)?;
    for provider in engine.registry().providers() {
        let executor = engine.registry().get(provider)?;
        let status = if executor.is_available() {
            "available"
        } else {
            "unavailable"
        };
        println!("{provider}\t{}\t{status}", executor.mode().as_str());
    }
    Ok(exit_codes::OK)
}

fn cmd_run(paths: &WorkspacePaths, provider: Option<Provider>, interactive: bool) -> Result<i32> {
    let selection = interactive.then(|| SelectionPolicy::Interactive(Box::new(StdinSelector)));
    let engine = build_engine(paths, selection)?;
    let _progress = print_progress(engine.bus());
    match engine.run_cycle_with(provider) {
        Ok(CycleOutcome::Executed(report)) => {
            print_report(&report);
            Ok(exit_codes::OK)
        }
        Ok(CycleOutcome::Idle) => {
            println!("no approved pending task");
            Ok(exit_codes::IDLE)
        }
        Err(err @ OrchestratorError::NoAgentAvailable) => {
            eprintln!("{err}");
            Ok(exit_codes::NO_AGENT)
        }
        Err(err @ OrchestratorError::SelectionCancelled) => {
            eprintln!("{err}");
            Ok(exit_codes::CANCELLED)
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_loop(paths: &WorkspacePaths, max_cycles: Option<u32>) -> Result<i32> {
    let engine = build_engine(paths, None)?;
    let _progress = print_progress(engine.bus());
    let outcome = run_loop(&engine, max_cycles, print_report)?;
    match outcome.stop {
        LoopStop::Idle => {
            println!("queue idle after {} cycle(s)", outcome.cycles_executed);
            Ok(exit_codes::OK)
        }
        LoopStop::MaxCycles { max_cycles } => {
            println!("stopped after reaching max cycles ({max_cycles})");
            Ok(exit_codes::OK)
        }
        LoopStop::NoAgent => {
            eprintln!("{}", OrchestratorError::NoAgentAvailable);
            Ok(exit_codes::NO_AGENT)
        }
    }
}

fn cmd_stats(paths: &WorkspacePaths) -> Result<i32> {
    let engine = build_engine(paths, None)?;
    let stats = engine.system_stats()?;
    println!("total:             {}", stats.total);
    println!("pending:           {}", stats.counts.pending);
    println!("awaiting approval: {}", stats.awaiting_approval);
    println!("in progress:       {}", stats.counts.in_progress);
    println!("completed:         {}", stats.counts.completed);
    println!("needs review:      {}", stats.counts.needs_review);
    println!("archived:          {}", stats.counts.archived);
    let registered: Vec<&str> = stats.registered.iter().map(|p| p.as_str()).collect();
    println!("providers:         {}", registered.join(", "));
    Ok(exit_codes::OK)
}

fn cmd_recent(paths: &WorkspacePaths, limit: usize) -> Result<i32> {
    let engine = build_engine(paths, None)?;
    for task in engine.recent_tasks(limit)? {
        let when = task
            .completed_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();
        println!("{when}\t{}\t{}\t{}", task.id, task.status.as_str(), task.title);
    }
    Ok(exit_codes::OK)
}

fn build_engine(paths: &WorkspacePaths, selection: Option<SelectionPolicy>) -> Result<Engine> {
    let cfg = paths
        .load_config()
        .with_context(|| format!("load {}", paths.config_path.display()))?;
    let env = ExecutorEnv::for_workspace(paths, &cfg);
    let registry = Arc::new(ExecutorRegistry::from_config(&cfg, &env));
    let repo: Arc<dyn TaskRepository> = Arc::new(JsonTaskStore::new(&paths.tasks_path));
    let mut options = EngineOptions::from_config(&cfg);
    if let Some(selection) = selection {
        options.selection = selection;
    }
    Ok(Engine::new(repo, EventBus::new(), registry, options))
}

/// Stream agent output and lifecycle events to the terminal.
fn print_progress(bus: &EventBus) -> Vec<Subscription> {
    vec![
        bus.subscribe(Topic::TaskStarted, |event| {
            if let Event::TaskStarted { task_id, provider } = event {
                eprintln!("started {task_id} on {provider}");
            }
        }),
        bus.subscribe(Topic::TaskOutput, |event| {
            if let Event::TaskOutput { chunk, .. } = event {
                print!("{}", chunk.text);
                let _ = std::io::stdout().flush();
            }
        }),
    ]
}

fn print_report(report: &ActReport) {
    println!(
        "{} -> {} ({})",
        report.task_id,
        report.status.as_str(),
        report.provider
    );
    if let Some(script) = &report.script_path {
        println!("script: {}", script.display());
    }
}

/// Prompts on stderr and reads a provider name or number from stdin.
struct StdinSelector;

impl ProviderSelector for StdinSelector {
    fn select(&self, available: &[Provider]) -> Option<Provider> {
        eprintln!("available providers:");
        for (idx, provider) in available.iter().enumerate() {
            eprintln!("  {}) {provider}", idx + 1);
        }
        eprint!("choose a provider (empty to cancel): ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        parse_choice(line.trim(), available)
    }
}

fn parse_choice(input: &str, available: &[Provider]) -> Option<Provider> {
    if input.is_empty() {
        return None;
    }
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|idx| available.get(idx)).copied();
    }
    input
        .parse::<Provider>()
        .ok()
        .filter(|provider| available.contains(provider))
}
