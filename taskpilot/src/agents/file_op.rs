//! File-operation executor: carry out literal "create folder/file" requests
//! without involving an agent.
//!
//! Only additive operations exist. Existing files are left untouched and
//! nothing is ever deleted.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::core::file_intent::{FileIntent, parse_file_intents};
use crate::core::types::{ExecutionOutcome, ExecutionResult, OutputChunk, Provider, StreamKind};
use crate::error::Outcome;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct FileOpExecutor {
    provider: Provider,
    root: PathBuf,
}

impl FileOpExecutor {
    pub fn new(provider: Provider, root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            root: root.into(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    #[instrument(skip_all, fields(task_id = %task.id, root = %self.root.display()))]
    pub(super) fn run(&self, task: &Task, sink: &Sender<OutputChunk>) -> Outcome<ExecutionOutcome> {
        let started = Instant::now();
        let intents = parse_file_intents(&task.text());
        if intents.is_empty() {
            info!("no file operations recognized");
            return Ok(ExecutionOutcome::Finished(ExecutionResult::succeeded(
                format!("processed task '{}': no file operations requested", task.title),
                elapsed_ms(started),
            )));
        }

        let mut lines = Vec::new();
        let mut touched = Vec::new();
        let mut errors = Vec::new();
        for intent in &intents {
            let line = match apply(&self.root, intent) {
                Ok(Applied::Created) => {
                    touched.push(display_path(intent.path()));
                    format!("created {} {}", kind(intent), display_path(intent.path()))
                }
                Ok(Applied::AlreadyPresent) => {
                    format!("left existing {} {}", kind(intent), display_path(intent.path()))
                }
                Err(err) => {
                    warn!(path = %intent.path().display(), err = %err, "file operation failed");
                    let line = format!(
                        "failed to create {} {}: {err}",
                        kind(intent),
                        display_path(intent.path())
                    );
                    errors.push(line.clone());
                    line
                }
            };
            let _ = sink.send(OutputChunk {
                stream: StreamKind::Stdout,
                text: format!("{line}\n"),
            });
            lines.push(line);
        }

        let output = lines.join("\n");
        let mut result = if errors.is_empty() {
            ExecutionResult::succeeded(output, elapsed_ms(started))
        } else {
            ExecutionResult::failed(output, errors.join("\n"), elapsed_ms(started))
        };
        result.files_modified = Some(touched);
        Ok(ExecutionOutcome::Finished(result))
    }
}

enum Applied {
    Created,
    AlreadyPresent,
}

fn apply(root: &Path, intent: &FileIntent) -> std::io::Result<Applied> {
    let target = root.join(intent.path());
    match intent {
        FileIntent::CreateFolder(_) => {
            if target.is_dir() {
                return Ok(Applied::AlreadyPresent);
            }
            fs::create_dir_all(&target)?;
            Ok(Applied::Created)
        }
        FileIntent::CreateFile(_) => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(_) => Ok(Applied::Created),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(Applied::AlreadyPresent),
                Err(e) => Err(e),
            }
        }
    }
}

fn kind(intent: &FileIntent) -> &'static str {
    match intent {
        FileIntent::CreateFolder(_) => "folder",
        FileIntent::CreateFile(_) => "file",
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;
    use std::sync::mpsc;

    fn run(root: &Path, text: &str) -> ExecutionResult {
        let (tx, _rx) = mpsc::channel();
        let mut t = task("t-1", 1);
        t.description = Some(text.to_string());
        match FileOpExecutor::new(Provider::Claude, root).run(&t, &tx).expect("run") {
            ExecutionOutcome::Finished(result) => result,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn creates_folder_and_nested_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = run(
            temp.path(),
            "Create a folder named docs and create a file named notes.md inside folder docs.",
        );
        assert!(result.success, "{result:?}");
        assert!(temp.path().join("docs").is_dir());
        assert!(temp.path().join("docs/notes.md").is_file());
        assert_eq!(
            result.files_modified,
            Some(vec!["docs".to_string(), "docs/notes.md".to_string()])
        );
    }

    #[test]
    fn never_overwrites_existing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("keep.txt"), "original").expect("seed");
        let result = run(temp.path(), "create a file named keep.txt");
        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("keep.txt")).unwrap(), "original");
        assert_eq!(result.files_modified, Some(Vec::new()));
        assert!(result.output.contains("left existing file keep.txt"));
    }

    #[test]
    fn unrecognized_text_is_a_successful_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = run(temp.path(), "refactor the parser");
        assert!(result.success);
        assert!(result.output.starts_with("processed task"));
        assert_eq!(result.files_modified, None);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn escaping_paths_are_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let inner = temp.path().join("inner");
        fs::create_dir(&inner).expect("inner");
        let result = run(&inner, "create a file named ../escape.txt");
        assert!(result.success);
        assert!(!temp.path().join("escape.txt").exists());
    }
}
