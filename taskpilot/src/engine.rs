//! The observe / orient / decide / act cycle.
//!
//! `Engine` owns no global state: the repository, event bus and executor
//! registry are injected, and the only mutable state it holds is the set of
//! task ids with an execution in flight. It is `Sync`, so different tasks may
//! be acted on from different threads.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::agents::ExecutorRegistry;
use crate::core::assessment::assess;
use crate::core::selector::{StatusCounts, next_ready_task};
use crate::core::types::{AgentConfig, ExecutionOutcome, Provider, TaskAssessment};
use crate::error::{OrchestratorError, Outcome};
use crate::events::{Event, EventBus};
use crate::io::config::{CompletionConfig, OrchestratorConfig};
use crate::io::task_store::TaskRepository;
use crate::task::{Task, TaskFilter, TaskPatch, TaskStatus};

/// Explanation stored when a terminal session's result never shows up.
pub const COMPLETION_NOT_OBSERVED: &str = "launched in terminal, completion not observed";

/// Picks a provider on behalf of a human.
pub trait ProviderSelector: Send + Sync {
    /// Choose one of `available`, or `None` to cancel.
    fn select(&self, available: &[Provider]) -> Option<Provider>;
}

pub enum SelectionPolicy {
    /// First available provider in this order, then registry order.
    Preferred(Vec<Provider>),
    Interactive(Box<dyn ProviderSelector>),
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Preferred(Vec::new())
    }
}

impl fmt::Debug for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::Preferred(order) => f.debug_tuple("Preferred").field(order).finish(),
            SelectionPolicy::Interactive(_) => f.write_str("Interactive(..)"),
        }
    }
}

/// How long to watch the task record after a detached terminal launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub poll_interval: Duration,
    /// Zero skips polling entirely.
    pub max_wait: Duration,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for CompletionPolicy {
    fn from(cfg: &CompletionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            max_wait: Duration::from_secs(cfg.max_wait_secs),
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineOptions {
    pub simulated: bool,
    pub selection: SelectionPolicy,
    pub completion: CompletionPolicy,
    /// Per-provider agent settings passed to each execution.
    pub agent_configs: BTreeMap<Provider, AgentConfig>,
}

impl EngineOptions {
    pub fn from_config(cfg: &OrchestratorConfig) -> Self {
        Self {
            simulated: cfg.simulated,
            selection: SelectionPolicy::Preferred(cfg.preferred.clone()),
            completion: CompletionPolicy::from(&cfg.completion),
            agent_configs: Provider::ALL
                .into_iter()
                .map(|provider| (provider, cfg.agent_config(provider)))
                .collect(),
        }
    }
}

/// Snapshot taken by `observe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub pending_count: usize,
    pub completed_count: usize,
    pub review_count: usize,
    pub next_task: Option<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStats {
    pub total: usize,
    pub counts: StatusCounts,
    /// Pending tasks that still wait for human approval.
    pub awaiting_approval: usize,
    pub in_flight: usize,
    pub registered: Vec<Provider>,
}

/// Where a task ended up after `act`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActReport {
    pub task_id: String,
    pub provider: Provider,
    pub status: TaskStatus,
    pub result: Option<String>,
    /// Script path when the task was handed to a terminal.
    pub script_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing approved and pending.
    Idle,
    Executed(ActReport),
}

pub struct Engine {
    repo: Arc<dyn TaskRepository>,
    bus: EventBus,
    registry: Arc<ExecutorRegistry>,
    options: EngineOptions,
    in_flight: Mutex<HashSet<String>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        bus: EventBus,
        registry: Arc<ExecutorRegistry>,
        options: EngineOptions,
    ) -> Self {
        Self {
            repo,
            bus,
            registry,
            options,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    #[instrument(skip(self))]
    pub fn observe(&self) -> Outcome<Observation> {
        let tasks = self.list_all()?;
        let counts = StatusCounts::tally(&tasks);
        let next_task = next_ready_task(&tasks, &self.in_flight_ids()).cloned();
        debug!(
            pending = counts.pending,
            next = next_task.as_ref().map(|t| t.id.as_str()),
            "observed queue"
        );
        Ok(Observation {
            pending_count: counts.pending,
            completed_count: counts.completed,
            review_count: counts.needs_review,
            next_task,
        })
    }

    /// Score `task` and announce the assessment on `task:updated`.
    pub fn orient(&self, task: &Task) -> TaskAssessment {
        let assessment = assess(task);
        debug!(task_id = %task.id, criticality = assessment.overall_criticality, "oriented task");
        self.bus.publish(Event::TaskUpdated {
            task_id: task.id.clone(),
            assessment,
        });
        assessment
    }

    #[instrument(skip(self))]
    pub fn decide(&self) -> Outcome<Provider> {
        if self.options.simulated {
            return self
                .registry
                .providers()
                .first()
                .copied()
                .ok_or(OrchestratorError::NoAgentAvailable);
        }

        let available = self.registry.available();
        if available.is_empty() {
            warn!("no registered executor is available");
            return Err(OrchestratorError::NoAgentAvailable);
        }
        match &self.options.selection {
            SelectionPolicy::Preferred(order) => order
                .iter()
                .copied()
                .find(|provider| available.contains(provider))
                .or_else(|| available.first().copied())
                .ok_or(OrchestratorError::NoAgentAvailable),
            SelectionPolicy::Interactive(selector) => selector
                .select(&available)
                .filter(|provider| available.contains(provider))
                .ok_or(OrchestratorError::SelectionCancelled),
        }
    }

    /// Execute one task on `provider` and settle its status.
    ///
    /// Execution failures are recorded on the task (`NEEDS_REVIEW`) and
    /// reported through the returned [`ActReport`]; `Err` is reserved for
    /// conditions that prevented the task from being run or recorded.
    #[instrument(skip(self))]
    pub fn act(&self, task_id: &str, provider: Provider) -> Outcome<ActReport> {
        let executor = self.registry.get(provider)?;
        let _slot = self.claim(task_id)?;

        let task = self.load(task_id)?;
        ensure_transition(&task.id, task.status, TaskStatus::InProgress)?;
        let task = self
            .repo
            .update(
                task_id,
                &TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    assigned_provider: Some(provider),
                    ..TaskPatch::default()
                },
            )
            .map_err(OrchestratorError::Repository)?;
        info!(task_id, mode = executor.mode().as_str(), "task started");
        self.bus.publish(Event::TaskStarted {
            task_id: task.id.clone(),
            provider,
        });

        let handle = executor.start(&task, self.options.agent_configs.get(&provider));
        let outcome = handle.wait_with(|chunk| {
            self.bus.publish(Event::TaskOutput {
                task_id: task.id.clone(),
                chunk,
            });
        });

        match outcome {
            Ok(ExecutionOutcome::Finished(result)) if result.success => {
                self.settle(&task, provider, TaskStatus::Completed, result.output, None)
            }
            Ok(ExecutionOutcome::Finished(result)) => self.settle(
                &task,
                provider,
                TaskStatus::NeedsReview,
                result.failure_text(),
                None,
            ),
            Ok(ExecutionOutcome::Launched {
                script_path,
                launcher,
            }) => self.await_external(&task, provider, script_path, &launcher),
            Err(err) => {
                warn!(task_id, err = %err, "executor error");
                self.settle(&task, provider, TaskStatus::NeedsReview, err.to_string(), None)
            }
        }
    }

    pub fn system_stats(&self) -> Outcome<SystemStats> {
        let tasks = self.list_all()?;
        Ok(SystemStats {
            total: tasks.len(),
            counts: StatusCounts::tally(&tasks),
            awaiting_approval: tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending && !t.human_approved)
                .count(),
            in_flight: self.in_flight_ids().len(),
            registered: self.registry.providers(),
        })
    }

    /// Tasks with a completion time, newest first.
    pub fn recent_tasks(&self, limit: usize) -> Outcome<Vec<Task>> {
        let mut finished: Vec<Task> = self
            .list_all()?
            .into_iter()
            .filter(|t| t.completed_at.is_some())
            .collect();
        finished.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        finished.truncate(limit);
        Ok(finished)
    }

    /// One observe / orient / decide / act pass.
    pub fn run_cycle(&self) -> Outcome<CycleOutcome> {
        self.run_cycle_with(None)
    }

    /// Like [`Engine::run_cycle`], but `provider` skips `decide` when given.
    pub fn run_cycle_with(&self, provider: Option<Provider>) -> Outcome<CycleOutcome> {
        let observation = self.observe()?;
        let Some(task) = observation.next_task else {
            return Ok(CycleOutcome::Idle);
        };
        self.orient(&task);
        let provider = match provider {
            Some(provider) => provider,
            None => self.decide()?,
        };
        self.act(&task.id, provider).map(CycleOutcome::Executed)
    }

    fn settle(
        &self,
        task: &Task,
        provider: Provider,
        status: TaskStatus,
        text: String,
        script_path: Option<PathBuf>,
    ) -> Outcome<ActReport> {
        ensure_transition(&task.id, TaskStatus::InProgress, status)?;
        let patch = TaskPatch {
            status: Some(status),
            result: Some(text.clone()),
            completed_at: (status == TaskStatus::Completed).then(Utc::now),
            ..TaskPatch::default()
        };
        self.repo
            .update(&task.id, &patch)
            .map_err(OrchestratorError::Repository)?;
        info!(task_id = %task.id, status = status.as_str(), "task settled");
        self.announce(&task.id, provider, status, &text);
        Ok(ActReport {
            task_id: task.id.clone(),
            provider,
            status,
            result: Some(text),
            script_path,
        })
    }

    /// Read the task record back until the external agent settles it or the
    /// completion policy runs out.
    ///
    /// Failed reads only cost a poll; an `Err` here means the final write failed
    /// or the record moved to a status the engine cannot settle from.
    fn await_external(
        &self,
        task: &Task,
        provider: Provider,
        script_path: PathBuf,
        launcher: &str,
    ) -> Outcome<ActReport> {
        let policy = self.options.completion;
        let deadline = Instant::now() + policy.max_wait;
        loop {
            // The agent edits the task file concurrently; a bad read is retried.
            match self.load(&task.id) {
                Ok(current) if current.status.is_settled() => {
                    return self.accept_external(current, provider, script_path);
                }
                Ok(current) if current.status != TaskStatus::InProgress => {
                    return Err(OrchestratorError::InvalidTransition {
                        id: current.id,
                        from: current.status,
                        to: TaskStatus::NeedsReview,
                    });
                }
                Ok(_) => {}
                Err(err) => warn!(task_id = %task.id, err = %err, "task read-back failed"),
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(policy.poll_interval.min(deadline - now));
        }

        info!(task_id = %task.id, launcher, "terminal session not observed to finish");
        let text = format!(
            "{COMPLETION_NOT_OBSERVED} (launcher: {launcher}, script: {})",
            script_path.display()
        );
        self.settle(task, provider, TaskStatus::NeedsReview, text, Some(script_path))
    }

    fn accept_external(
        &self,
        mut current: Task,
        provider: Provider,
        script_path: PathBuf,
    ) -> Outcome<ActReport> {
        if current.status == TaskStatus::Completed && current.completed_at.is_none() {
            current = self
                .repo
                .update(
                    &current.id,
                    &TaskPatch {
                        completed_at: Some(Utc::now()),
                        ..TaskPatch::default()
                    },
                )
                .map_err(OrchestratorError::Repository)?;
        }
        let text = current.result.clone().unwrap_or_else(|| match current.status {
            TaskStatus::Completed => "completed in terminal session".to_string(),
            _ => "flagged for review in terminal session".to_string(),
        });
        info!(
            task_id = %current.id,
            status = current.status.as_str(),
            "external agent settled task"
        );
        self.announce(&current.id, provider, current.status, &text);
        Ok(ActReport {
            task_id: current.id,
            provider,
            status: current.status,
            result: current.result,
            script_path: Some(script_path),
        })
    }

    fn announce(&self, task_id: &str, provider: Provider, status: TaskStatus, text: &str) {
        let event = match status {
            TaskStatus::Completed => Event::TaskCompleted {
                task_id: task_id.to_string(),
                provider,
                output: text.to_string(),
            },
            _ => Event::TaskFailed {
                task_id: task_id.to_string(),
                provider,
                error: text.to_string(),
            },
        };
        self.bus.publish(event);
    }

    fn load(&self, task_id: &str) -> Outcome<Task> {
        self.repo
            .get(task_id)
            .map_err(OrchestratorError::Repository)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    fn list_all(&self) -> Outcome<Vec<Task>> {
        self.repo
            .list(&TaskFilter::all())
            .map_err(OrchestratorError::Repository)
    }

    fn in_flight_ids(&self) -> HashSet<String> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self, task_id: &str) -> Outcome<InFlightSlot<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(task_id.to_string()) {
            return Err(OrchestratorError::AlreadyRunning(task_id.to_string()));
        }
        Ok(InFlightSlot {
            set: &self.in_flight,
            id: task_id.to_string(),
        })
    }
}

/// Releases a task's single-flight slot on drop.
struct InFlightSlot<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn ensure_transition(id: &str, from: TaskStatus, to: TaskStatus) -> Outcome<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}
