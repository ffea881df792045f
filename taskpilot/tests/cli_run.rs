//! CLI tests for `taskpilot` commands.
//!
//! Spawns the binary against a temp workspace in simulated mode and verifies
//! exit codes and the resulting task file.

use std::path::Path;
use std::process::{Command, Output};

use taskpilot::exit_codes;
use taskpilot::io::config::{OrchestratorConfig, write_config};
use taskpilot::io::init::{InitOptions, WorkspacePaths, init_workspace};
use taskpilot::io::task_store::{JsonTaskStore, TaskRepository};
use taskpilot::task::{TaskFilter, TaskStatus};

fn taskpilot(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskpilot"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn taskpilot")
}

fn simulated_workspace() -> (tempfile::TempDir, WorkspacePaths) {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
    write_config(
        &paths.config_path,
        &OrchestratorConfig {
            simulated: true,
            simulated_delay_ms: 0,
            ..OrchestratorConfig::default()
        },
    )
    .expect("write config");
    (temp, paths)
}

#[test]
fn init_scaffolds_workspace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = taskpilot(temp.path(), &["init"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let paths = WorkspacePaths::new(temp.path());
    assert!(paths.config_path.exists());
    assert!(paths.tasks_path.exists());
}

#[test]
fn run_executes_approved_task_then_goes_idle() {
    let (temp, paths) = simulated_workspace();

    let unapproved = taskpilot(temp.path(), &["add", "--title", "Later", "--priority", "3"]);
    assert_eq!(unapproved.status.code(), Some(exit_codes::OK));
    let added = taskpilot(
        temp.path(),
        &["add", "--title", "Write docs", "--priority", "1", "--approve"],
    );
    assert_eq!(added.status.code(), Some(exit_codes::OK));
    let id = String::from_utf8_lossy(&added.stdout).trim().to_string();

    let run = taskpilot(temp.path(), &["run"]);
    assert_eq!(
        run.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&run.stderr)
    );
    let store = JsonTaskStore::new(&paths.tasks_path);
    let task = store.get(&id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Completed);

    let idle = taskpilot(temp.path(), &["run"]);
    assert_eq!(idle.status.code(), Some(exit_codes::IDLE));

    let pending = store
        .list(&TaskFilter::with_status(TaskStatus::Pending))
        .expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "Later");
}

#[test]
fn approve_then_loop_drains_queue() {
    let (temp, paths) = simulated_workspace();
    let added = taskpilot(temp.path(), &["add", "--title", "One"]);
    let id = String::from_utf8_lossy(&added.stdout).trim().to_string();
    taskpilot(temp.path(), &["add", "--title", "Two", "--approve"]);

    let approve = taskpilot(temp.path(), &["approve", &id]);
    assert_eq!(approve.status.code(), Some(exit_codes::OK));

    let looped = taskpilot(temp.path(), &["loop"]);
    assert_eq!(looped.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&looped.stdout);
    assert!(stdout.contains("queue idle after 2 cycle(s)"), "{stdout}");

    let store = JsonTaskStore::new(&paths.tasks_path);
    let tasks = store.list(&TaskFilter::all()).expect("list");
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let recent = taskpilot(temp.path(), &["recent", "--limit", "1"]);
    assert_eq!(String::from_utf8_lossy(&recent.stdout).lines().count(), 1);
}

#[test]
fn approving_unknown_task_is_invalid() {
    let (temp, _paths) = simulated_workspace();
    let out = taskpilot(temp.path(), &["approve", "does-not-exist"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
}
