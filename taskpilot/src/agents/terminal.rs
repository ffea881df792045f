//! Terminal executor: write a launcher script and open it in a new window.
//!
//! The agent runs interactively in front of the user, so completion is not
//! observed here. The engine reads the task record back afterwards.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{info, instrument};

use crate::core::script::{ScriptInputs, render_script};
use crate::core::types::{AgentConfig, ExecutionOutcome, OutputChunk, Provider, StreamKind};
use crate::error::{OrchestratorError, Outcome};
use crate::io::platform::{Platform, agent_command};
use crate::io::process::probe_command;
use crate::io::prompt::PromptBuilder;
use crate::io::scratch;
use crate::io::terminal::{TerminalLaunch, launch_detached_terminal, make_executable};
use crate::task::Task;

use super::ExecutorEnv;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TerminalExecutor {
    config: AgentConfig,
    prompts: PromptBuilder,
    workdir: PathBuf,
    scratch_dir: PathBuf,
    platform: Platform,
    probe_timeout: Duration,
}

impl TerminalExecutor {
    pub fn new(config: AgentConfig, env: &ExecutorEnv) -> Self {
        Self {
            config,
            prompts: PromptBuilder::new(&env.task_file),
            workdir: env.workdir.clone(),
            scratch_dir: env.scratch_dir.clone(),
            platform: env.platform,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn is_available(&self) -> bool {
        let cmd = agent_command(
            self.platform,
            &self.config.command,
            &["--version".to_string()],
            self.config.use_wsl,
        );
        probe_command(cmd, self.probe_timeout)
    }

    #[instrument(skip_all, fields(task_id = %task.id, provider = %self.provider()))]
    pub(super) fn run(
        &self,
        task: &Task,
        config: Option<&AgentConfig>,
        sink: &Sender<OutputChunk>,
    ) -> Outcome<ExecutionOutcome> {
        let config = config.unwrap_or(&self.config);
        let script_path = self.write_session(task, config)?;
        let _ = sink.send(OutputChunk {
            stream: StreamKind::Stdout,
            text: format!("launcher script written to {}\n", script_path.display()),
        });

        let title = format!("taskpilot {}", task.id);
        match launch_detached_terminal(self.platform, &script_path, &title) {
            TerminalLaunch::Launched { launcher } => {
                info!(launcher, script = %script_path.display(), "agent session launched");
                Ok(ExecutionOutcome::Launched {
                    script_path,
                    launcher,
                })
            }
            TerminalLaunch::Unavailable { attempted } => Err(OrchestratorError::ExecutionFailed(
                format!(
                    "no terminal launcher available (tried {}); script left at {}",
                    attempted.join(", "),
                    script_path.display()
                ),
            )),
        }
    }

    /// Reserve scratch files and write the prompt and launcher script.
    pub(crate) fn write_session(&self, task: &Task, config: &AgentConfig) -> Outcome<PathBuf> {
        let prompt = self.prompts.build(task).map_err(execution_failed)?;
        let kind = self.platform.script_kind();
        let files = scratch::reserve(&self.scratch_dir, &task.id, kind).map_err(execution_failed)?;
        scratch::write(&files.prompt_path, &prompt).map_err(execution_failed)?;

        let script = render_script(
            kind,
            &ScriptInputs {
                task,
                workdir: &self.workdir,
                prompt_path: &files.prompt_path,
                command: &config.command,
                args: &config.args,
            },
        );
        scratch::write(&files.script_path, &script).map_err(execution_failed)?;
        make_executable(&files.script_path).map_err(|err| {
            OrchestratorError::ExecutionFailed(format!(
                "mark {} executable: {err}",
                files.script_path.display()
            ))
        })?;
        Ok(files.script_path)
    }
}

fn execution_failed(err: anyhow::Error) -> OrchestratorError {
    OrchestratorError::ExecutionFailed(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DispatchMode;
    use crate::test_support::task;
    use std::fs;

    fn executor(root: &std::path::Path, platform: Platform) -> TerminalExecutor {
        let env = ExecutorEnv {
            workdir: root.to_path_buf(),
            task_file: root.join("tasks.json"),
            scratch_dir: root.join("scratch"),
            platform,
        };
        TerminalExecutor::new(
            AgentConfig::for_provider(Provider::Claude, DispatchMode::Terminal),
            &env,
        )
    }

    #[test]
    fn session_files_embed_prompt_path_and_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor(temp.path(), Platform::Linux);
        let t = task("task/42", 2);
        let script_path = exec.write_session(&t, &exec.config).expect("write");

        assert!(script_path.starts_with(temp.path().join("scratch")));
        let name = script_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("task_42-"), "{name}");
        assert!(name.ends_with(".sh"));

        let script = fs::read_to_string(&script_path).expect("script");
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains(".prompt.md"));
        assert!(script.contains("Id:       task/42"));

        let prompt_path = script_path.with_extension("").with_extension("prompt.md");
        let prompt = fs::read_to_string(prompt_path).expect("prompt");
        assert!(prompt.contains("task/42"));
    }

    #[test]
    fn windows_sessions_use_cmd_scripts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor(temp.path(), Platform::Windows);
        let script_path = exec
            .write_session(&task("t-1", 0), &exec.config)
            .expect("write");
        assert_eq!(script_path.extension().and_then(|e| e.to_str()), Some("cmd"));
        let script = fs::read_to_string(&script_path).expect("script");
        assert!(script.starts_with("@echo off\r\n"));
    }

    #[test]
    fn repeated_sessions_get_distinct_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor(temp.path(), Platform::Linux);
        let t = task("same-id", 1);
        let a = exec.write_session(&t, &exec.config).expect("a");
        let b = exec.write_session(&t, &exec.config).expect("b");
        assert_ne!(a, b);
    }
}
