//! Agent executors and the registry that maps providers to them.
//!
//! Executors are a closed set, dispatched by `match`. Every execution runs on
//! its own thread: [`AgentExecutor::start`] hands back the output channel and
//! a completion handle, and the caller decides how to consume them.

use std::any::Any;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, instrument};

use crate::core::types::{AgentConfig, DispatchMode, ExecutionOutcome, OutputChunk, Provider};
use crate::error::{OrchestratorError, Outcome};
use crate::io::config::OrchestratorConfig;
use crate::io::init::WorkspacePaths;
use crate::io::platform::Platform;
use crate::task::Task;

pub mod file_op;
pub mod headless;
pub mod registry;
pub mod simulated;
pub mod terminal;

pub use file_op::FileOpExecutor;
pub use headless::HeadlessExecutor;
pub use registry::ExecutorRegistry;
pub use simulated::{SimulatedBehavior, SimulatedExecutor};
pub use terminal::TerminalExecutor;

/// Host facts every process-backed executor needs.
#[derive(Debug, Clone)]
pub struct ExecutorEnv {
    /// Working directory for agent processes and root for file operations.
    pub workdir: PathBuf,
    /// Task file the agent is told to update.
    pub task_file: PathBuf,
    pub scratch_dir: PathBuf,
    pub platform: Platform,
}

impl ExecutorEnv {
    pub fn for_workspace(paths: &WorkspacePaths, cfg: &OrchestratorConfig) -> Self {
        Self {
            workdir: paths.root.clone(),
            task_file: paths.tasks_path.clone(),
            scratch_dir: paths.scratch_dir(cfg),
            platform: Platform::current(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentExecutor {
    Headless(HeadlessExecutor),
    Terminal(TerminalExecutor),
    Simulated(SimulatedExecutor),
    FileOp(FileOpExecutor),
}

impl AgentExecutor {
    pub fn provider(&self) -> Provider {
        match self {
            AgentExecutor::Headless(e) => e.provider(),
            AgentExecutor::Terminal(e) => e.provider(),
            AgentExecutor::Simulated(e) => e.provider(),
            AgentExecutor::FileOp(e) => e.provider(),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        match self {
            AgentExecutor::Headless(_) => DispatchMode::Headless,
            AgentExecutor::Terminal(_) => DispatchMode::Terminal,
            AgentExecutor::Simulated(_) => DispatchMode::Simulated,
            AgentExecutor::FileOp(_) => DispatchMode::FileOp,
        }
    }

    /// Probe the backend. Any probe error counts as unavailable.
    pub fn is_available(&self) -> bool {
        let available = match self {
            AgentExecutor::Headless(e) => e.is_available(),
            AgentExecutor::Terminal(e) => e.is_available(),
            AgentExecutor::Simulated(_) => true,
            AgentExecutor::FileOp(e) => e.is_available(),
        };
        debug!(
            provider = %self.provider(),
            mode = self.mode().as_str(),
            available,
            "probed executor"
        );
        available
    }

    /// Begin executing `task` on a worker thread.
    ///
    /// `config` overrides the executor's own agent settings for this call only.
    #[instrument(
        skip_all,
        fields(task_id = %task.id, provider = %self.provider(), mode = self.mode().as_str())
    )]
    pub fn start(&self, task: &Task, config: Option<&AgentConfig>) -> ExecutionHandle {
        let (tx, rx) = mpsc::channel();
        let executor = self.clone();
        let task = task.clone();
        let config = config.cloned();
        let completion = thread::spawn(move || executor.run(&task, config.as_ref(), &tx));
        ExecutionHandle {
            output: rx,
            completion,
        }
    }

    /// `start` followed by draining the output and joining.
    pub fn execute(&self, task: &Task, config: Option<&AgentConfig>) -> Outcome<ExecutionOutcome> {
        self.start(task, config).wait()
    }

    fn run(
        &self,
        task: &Task,
        config: Option<&AgentConfig>,
        sink: &Sender<OutputChunk>,
    ) -> Outcome<ExecutionOutcome> {
        match self {
            AgentExecutor::Headless(e) => e.run(task, config, sink),
            AgentExecutor::Terminal(e) => e.run(task, config, sink),
            AgentExecutor::Simulated(e) => e.run(task, sink),
            AgentExecutor::FileOp(e) => e.run(task, sink),
        }
    }
}

/// A running execution: streamed output plus the eventual outcome.
///
/// The output channel closes once the worker and every reader it spawned are
/// done, so draining it to the end never blocks past completion.
#[derive(Debug)]
pub struct ExecutionHandle {
    output: Receiver<OutputChunk>,
    completion: JoinHandle<Outcome<ExecutionOutcome>>,
}

impl ExecutionHandle {
    pub fn output(&self) -> &Receiver<OutputChunk> {
        &self.output
    }

    /// Forward every chunk to `on_chunk` until the stream closes, then join.
    pub fn wait_with(self, mut on_chunk: impl FnMut(OutputChunk)) -> Outcome<ExecutionOutcome> {
        for chunk in &self.output {
            on_chunk(chunk);
        }
        join_completion(self.completion)
    }

    /// Discard output and join.
    pub fn wait(self) -> Outcome<ExecutionOutcome> {
        self.wait_with(|_| {})
    }
}

fn join_completion(handle: JoinHandle<Outcome<ExecutionOutcome>>) -> Outcome<ExecutionOutcome> {
    match handle.join() {
        Ok(outcome) => outcome,
        Err(panic) => Err(OrchestratorError::ExecutionFailed(format!(
            "executor thread panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionResult, StreamKind};
    use crate::test_support::task;

    #[test]
    fn execute_drains_and_joins() {
        let executor = AgentExecutor::Simulated(
            SimulatedExecutor::new(Provider::Codex).with_chunks(["one\n", "two\n"]),
        );
        let handle = executor.start(&task("t-1", 1), None);
        let mut seen = Vec::new();
        let outcome = handle
            .wait_with(|chunk| {
                assert_eq!(chunk.stream, StreamKind::Stdout);
                seen.push(chunk.text);
            })
            .expect("outcome");
        assert_eq!(seen, vec!["one\n", "two\n"]);
        match outcome {
            ExecutionOutcome::Finished(ExecutionResult { success, .. }) => assert!(success),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn worker_panic_becomes_execution_failed() {
        let handle = ExecutionHandle {
            output: mpsc::channel().1,
            completion: thread::spawn(|| panic!("kaboom")),
        };
        match handle.wait() {
            Err(OrchestratorError::ExecutionFailed(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn simulated_is_always_available() {
        let executor = AgentExecutor::Simulated(SimulatedExecutor::new(Provider::Claude));
        assert!(executor.is_available());
        assert_eq!(executor.mode(), DispatchMode::Simulated);
        assert_eq!(executor.provider(), Provider::Claude);
    }
}
