//! Prompt builder for deterministic agent input.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::task::Task;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Task fields exposed to the template.
#[derive(Debug, Clone, Serialize)]
struct TaskContext<'a> {
    id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    category: Option<&'a str>,
    priority: u8,
    priority_label: &'a str,
    affected_files: &'a [String],
    dependencies: &'a [String],
}

impl<'a> TaskContext<'a> {
    fn from_task(task: &'a Task) -> Self {
        Self {
            id: &task.id,
            title: task.title.trim(),
            description: task
                .description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            category: task
                .category
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            priority: task.priority,
            priority_label: task.priority_label(),
            affected_files: &task.affected_files,
            dependencies: &task.dependencies,
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("task", TASK_TEMPLATE)
            .context("load task prompt template")?;
        Ok(Self { env })
    }

    fn render_task(&self, task: &Task, task_file: &Path) -> Result<String> {
        let template = self.env.get_template("task")?;
        let task_ctx = TaskContext::from_task(task);
        let rendered = template
            .render(context! {
                id => task_ctx.id,
                title => task_ctx.title,
                description => task_ctx.description,
                category => task_ctx.category,
                priority => task_ctx.priority,
                priority_label => task_ctx.priority_label,
                affected_files => task_ctx.affected_files,
                dependencies => task_ctx.dependencies,
                task_file => task_file.display().to_string(),
            })
            .with_context(|| format!("render prompt for task {}", task.id))?;
        Ok(rendered)
    }
}

/// Renders the instruction text handed to an agent for one task.
///
/// Output depends only on the task and the task-file path, so the same task
/// always yields the same prompt.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    task_file: PathBuf,
}

impl PromptBuilder {
    /// `task_file` is made absolute so agents running elsewhere can still find it.
    pub fn new(task_file: impl Into<PathBuf>) -> Self {
        let task_file = task_file.into();
        let task_file = std::path::absolute(&task_file).unwrap_or(task_file);
        Self { task_file }
    }

    pub fn task_file(&self) -> &Path {
        &self.task_file
    }

    pub fn build(&self, task: &Task) -> Result<String> {
        PromptEngine::new()?.render_task(task, &self.task_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("/srv/tasks/tasks.json")
    }

    #[test]
    fn task_id_appears_exactly_once() {
        let mut t = task("9f2c6a1e-task", 2);
        t.description = Some("Fix the flaky upload".to_string());
        t.affected_files = vec!["src/upload.rs".to_string()];
        let prompt = builder().build(&t).expect("render");
        assert_eq!(prompt.matches("9f2c6a1e-task").count(), 1);
    }

    #[test]
    fn rendering_is_deterministic() {
        let t = task("t-1", 1);
        assert_eq!(builder().build(&t).unwrap(), builder().build(&t).unwrap());
    }

    #[test]
    fn closing_section_names_task_file_and_statuses() {
        let prompt = builder().build(&task("t-1", 0)).expect("render");
        let closing = prompt.find("### When You Are Done").expect("closing section");
        let tail = &prompt[closing..];
        assert!(tail.contains("/srv/tasks/tasks.json"));
        assert!(tail.contains("`COMPLETED`"));
        assert!(tail.contains("`NEEDS_REVIEW`"));
    }

    #[test]
    fn optional_sections_render_only_when_present() {
        let mut t = task("t-1", 3);
        let bare = builder().build(&t).expect("render");
        assert!(!bare.contains("### Description"));
        assert!(!bare.contains("### Affected Files"));
        assert!(!bare.contains("Category:"));
        assert!(bare.contains("- Priority: urgent (3 of 3)"));

        t.description = Some("  Rotate keys  ".to_string());
        t.category = Some("security".to_string());
        t.affected_files = vec!["a.rs".to_string(), "b.rs".to_string()];
        t.dependencies = vec!["other-task".to_string()];
        let full = builder().build(&t).expect("render");
        assert!(full.contains("### Description\n\nRotate keys\n"));
        assert!(full.contains("- Category: security"));
        assert!(full.contains("- a.rs\n- b.rs\n"));
        assert!(full.contains("### Depends On"));

        let details = full.find("### Details").unwrap();
        let files = full.find("### Affected Files").unwrap();
        let closing = full.find("### When You Are Done").unwrap();
        assert!(details < files && files < closing);
    }
}
