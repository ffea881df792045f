//! Simulated executor for demos and tests. Never spawns anything.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::core::types::{ExecutionOutcome, ExecutionResult, OutputChunk, Provider, StreamKind};
use crate::error::{OrchestratorError, Outcome};
use crate::task::Task;

/// What a simulated run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatedBehavior {
    #[default]
    Succeed,
    /// A finished but unsuccessful result.
    Fail,
    /// An executor error instead of a result.
    Error,
    /// Hand the task off as if to a detached terminal session.
    Launch,
}

#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    provider: Provider,
    delay: Duration,
    behavior: SimulatedBehavior,
    chunks: Vec<String>,
}

impl SimulatedExecutor {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            delay: Duration::ZERO,
            behavior: SimulatedBehavior::Succeed,
            chunks: Vec::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_behavior(mut self, behavior: SimulatedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub(super) fn run(&self, task: &Task, sink: &Sender<OutputChunk>) -> Outcome<ExecutionOutcome> {
        for text in &self.chunks {
            let _ = sink.send(OutputChunk {
                stream: StreamKind::Stdout,
                text: text.clone(),
            });
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        // Reported duration is the configured delay so results stay deterministic.
        let duration_ms = self.delay.as_millis() as u64;
        debug!(task_id = %task.id, behavior = ?self.behavior, "simulated execution finished");

        match self.behavior {
            SimulatedBehavior::Succeed => Ok(ExecutionOutcome::Finished(ExecutionResult::succeeded(
                format!("[simulated] {} completed: {}", self.provider, task.title),
                duration_ms,
            ))),
            SimulatedBehavior::Fail => {
                let mut result = ExecutionResult::failed(
                    String::new(),
                    format!("[simulated] {} could not complete: {}", self.provider, task.title),
                    duration_ms,
                );
                result.exit_code = Some(1);
                Ok(ExecutionOutcome::Finished(result))
            }
            SimulatedBehavior::Error => Err(OrchestratorError::ExecutionFailed(format!(
                "[simulated] {} executor error",
                self.provider
            ))),
            SimulatedBehavior::Launch => Ok(ExecutionOutcome::Launched {
                script_path: PathBuf::from(format!("{}.simulated", task.id)),
                launcher: "simulated".to_string(),
            }),
        }
    }
}
