use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Provider;

/// Highest task priority.
pub const MAX_PRIORITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    NeedsReview,
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::NeedsReview => "NEEDS_REVIEW",
            TaskStatus::Archived => "ARCHIVED",
        }
    }

    /// Edges the orchestrator is allowed to take.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::NeedsReview)
        )
    }

    /// Statuses an execution may settle in.
    pub fn is_settled(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::NeedsReview)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub priority: u8,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_provider: Option<Provider>,
    #[serde(default)]
    pub human_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Title and description joined for text matching.
    pub fn text(&self) -> String {
        match self.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => format!("{}\n{}", self.title, desc),
            _ => self.title.clone(),
        }
    }

    pub fn priority_label(&self) -> &'static str {
        match self.priority {
            0 => "low",
            1 => "medium",
            2 => "high",
            _ => "urgent",
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::Pending && self.human_approved
    }
}

/// Input for creating a task through a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: u8,
    pub affected_files: Vec<String>,
    pub dependencies: Vec<String>,
    pub human_approved: bool,
}

impl NewTask {
    pub fn into_task(self, id: String) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority.min(MAX_PRIORITY),
            affected_files: self.affected_files,
            dependencies: self.dependencies,
            status: TaskStatus::Pending,
            assigned_provider: None,
            human_approved: self.human_approved,
            result: None,
            completed_at: None,
        }
    }
}

/// Partial update applied by `TaskRepository::update`. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub assigned_provider: Option<Provider>,
    pub human_approved: Option<bool>,
    pub result: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(provider) = self.assigned_provider {
            task.assigned_provider = Some(provider);
        }
        if let Some(approved) = self.human_approved {
            task.human_approved = approved;
        }
        if let Some(result) = &self.result {
            task.result = Some(result.clone());
        }
        if let Some(at) = self.completed_at {
            task.completed_at = Some(at);
        }
    }
}

/// Filter for `TaskRepository::list`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub approved_only: bool,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            approved_only: false,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }
        !self.approved_only || task.human_approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_edges_are_legal() {
        use TaskStatus::{Archived, Completed, InProgress, NeedsReview, Pending};
        let all = [Pending, InProgress, Completed, NeedsReview, Archived];
        let mut legal = Vec::new();
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    legal.push((from, to));
                }
            }
        }
        assert_eq!(
            legal,
            vec![
                (Pending, InProgress),
                (InProgress, Completed),
                (InProgress, NeedsReview)
            ]
        );
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&TaskStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"NEEDS_REVIEW\"");
    }

    #[test]
    fn new_task_clamps_priority_and_starts_pending() {
        let task = NewTask {
            title: "t".to_string(),
            priority: 9,
            ..NewTask::default()
        }
        .into_task("id-1".to_string());
        assert_eq!(task.priority, MAX_PRIORITY);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.human_approved);
    }

    #[test]
    fn patch_leaves_unset_fields_alone() {
        let mut task = NewTask {
            title: "t".to_string(),
            ..NewTask::default()
        }
        .into_task("id-1".to_string());
        task.result = Some("old".to_string());

        TaskPatch::status(TaskStatus::InProgress).apply(&mut task);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.result.as_deref(), Some("old"));
    }
}
