//! In-process publish/subscribe for task progress.
//!
//! Handlers run synchronously on the publishing thread, outside the bus lock.
//! Consumers that may be slow should use [`EventBus::subscribe_channel`] so the
//! publisher never waits on them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tracing::warn;

use crate::core::types::{OutputChunk, Provider, TaskAssessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    TaskUpdated,
    TaskStarted,
    TaskOutput,
    TaskCompleted,
    TaskFailed,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::TaskUpdated,
        Topic::TaskStarted,
        Topic::TaskOutput,
        Topic::TaskCompleted,
        Topic::TaskFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::TaskUpdated => "task:updated",
            Topic::TaskStarted => "task:started",
            Topic::TaskOutput => "task:output",
            Topic::TaskCompleted => "task:completed",
            Topic::TaskFailed => "task:failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskUpdated {
        task_id: String,
        assessment: TaskAssessment,
    },
    TaskStarted {
        task_id: String,
        provider: Provider,
    },
    TaskOutput {
        task_id: String,
        chunk: OutputChunk,
    },
    TaskCompleted {
        task_id: String,
        provider: Provider,
        output: String,
    },
    TaskFailed {
        task_id: String,
        provider: Provider,
        error: String,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::TaskUpdated { .. } => Topic::TaskUpdated,
            Event::TaskStarted { .. } => Topic::TaskStarted,
            Event::TaskOutput { .. } => Topic::TaskOutput,
            Event::TaskCompleted { .. } => Topic::TaskCompleted,
            Event::TaskFailed { .. } => Topic::TaskFailed,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Event::TaskUpdated { task_id, .. }
            | Event::TaskStarted { task_id, .. }
            | Event::TaskOutput { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. } => task_id,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
}

impl BusInner {
    fn remove(&self, topic: Topic, id: u64) {
        match self.handlers.lock() {
            Ok(mut handlers) => {
                if let Some(list) = handlers.get_mut(&topic) {
                    list.retain(|(handler_id, _)| *handler_id != id);
                }
            }
            Err(_) => warn!(topic = topic.as_str(), "event bus lock poisoned on unsubscribe"),
        }
    }
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every handler subscribed to its topic.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let handlers: Vec<Handler> = match self.inner.handlers.lock() {
            Ok(handlers) => handlers
                .get(&topic)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => {
                warn!(topic = topic.as_str(), "event bus lock poisoned, dropping event");
                return;
            }
        };
        for handler in handlers {
            handler(&event);
        }
    }

    /// Register `handler` for `topic`. Dropping the returned guard unsubscribes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.handlers.lock() {
            Ok(mut handlers) => handlers
                .entry(topic)
                .or_default()
                .push((id, Arc::new(handler))),
            Err(_) => warn!(topic = topic.as_str(), "event bus lock poisoned on subscribe"),
        }
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Subscribe with an unbounded channel instead of a callback.
    pub fn subscribe_channel(&self, topic: Topic) -> (Subscription, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let subscription = self.subscribe(topic, move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    pub fn handler_count(&self, topic: Topic) -> usize {
        self.inner
            .handlers
            .lock()
            .map(|handlers| handlers.get(&topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

/// Live subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id);
        }
    }
}
