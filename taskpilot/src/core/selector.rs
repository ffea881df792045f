//! Deterministic selection logic for the task queue.

use std::collections::HashSet;

use crate::task::{Task, TaskStatus};

/// Pick the highest-priority task that is pending and human-approved.
///
/// Ties keep the input order. Ids in `in_flight` are skipped.
pub fn next_ready_task<'a>(tasks: &'a [Task], in_flight: &HashSet<String>) -> Option<&'a Task> {
    let mut ready: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.is_ready() && !in_flight.contains(&task.id))
        .collect();
    // `sort_by` is stable, so equal priorities keep repository order.
    ready.sort_by(|a, b| b.priority.cmp(&a.priority));
    ready.into_iter().next()
}

/// Per-status counts over a task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub needs_review: usize,
    pub archived: usize,
}

impl StatusCounts {
    pub fn tally(tasks: &[Task]) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::NeedsReview => counts.needs_review += 1,
                TaskStatus::Archived => counts.archived += 1,
            }
        }
        counts
    }
}
