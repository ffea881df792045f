//! Test-only helpers for building tasks, engines and event recorders.

use std::sync::{Arc, Mutex, PoisonError};

use crate::agents::{AgentExecutor, ExecutorRegistry};
use crate::engine::{Engine, EngineOptions};
use crate::events::{Event, EventBus, Subscription, Topic};
use crate::io::task_store::InMemoryTaskRepository;
use crate::task::{Task, TaskStatus};

/// Deterministic pending task. The title never contains the id.
pub fn task(id: &str, priority: u8) -> Task {
    Task {
        id: id.to_string(),
        title: "Sample task".to_string(),
        description: None,
        category: None,
        priority,
        affected_files: Vec::new(),
        dependencies: Vec::new(),
        status: TaskStatus::Pending,
        assigned_provider: None,
        human_approved: false,
        result: None,
        completed_at: None,
    }
}

/// Pending task that is ready for selection.
pub fn approved_task(id: &str, priority: u8) -> Task {
    Task {
        human_approved: true,
        ..task(id, priority)
    }
}

/// Engine over an in-memory repository with the given executors registered.
pub fn engine_with(
    tasks: Vec<Task>,
    executors: Vec<AgentExecutor>,
    options: EngineOptions,
) -> Engine {
    Engine::new(
        Arc::new(InMemoryTaskRepository::with_tasks(tasks)),
        EventBus::new(),
        Arc::new(ExecutorRegistry::with_executors(executors)),
        options,
    )
}

/// Records every event published on a bus, across all topics.
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
    _subscriptions: Vec<Subscription>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = Topic::ALL
            .into_iter()
            .map(|topic| {
                let sink = Arc::clone(&events);
                bus.subscribe(topic, move |event| {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(event.clone());
                })
            })
            .collect();
        Self {
            events,
            _subscriptions: subscriptions,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events on `topic` for `task_id`, in publish order.
    pub fn for_task(&self, topic: Topic, task_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.topic() == topic && e.task_id() == task_id)
            .collect()
    }
}
