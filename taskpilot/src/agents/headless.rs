//! Headless executor: pipe the prompt into a non-interactive agent CLI.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::types::{AgentConfig, ExecutionOutcome, ExecutionResult, OutputChunk, Provider};
use crate::error::{OrchestratorError, Outcome};
use crate::io::platform::{Platform, agent_command};
use crate::io::process::{CommandOutput, probe_command, run_command_with_timeout};
use crate::io::prompt::PromptBuilder;
use crate::task::Task;

use super::ExecutorEnv;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_OUTPUT_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct HeadlessExecutor {
    config: AgentConfig,
    prompts: PromptBuilder,
    workdir: PathBuf,
    platform: Platform,
    probe_timeout: Duration,
    output_limit_bytes: usize,
}

impl HeadlessExecutor {
    pub fn new(config: AgentConfig, env: &ExecutorEnv) -> Self {
        Self {
            config,
            prompts: PromptBuilder::new(&env.task_file),
            workdir: env.workdir.clone(),
            platform: env.platform,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit_bytes = limit;
        self
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// `<command> --version` exits zero within the probe timeout.
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
        let prompt = self
            .prompts
            .build(task)
            .map_err(|err| OrchestratorError::ExecutionFailed(format!("{err:#}")))?;

        let mut cmd = agent_command(self.platform, &config.command, &config.args, config.use_wsl);
        cmd.current_dir(&self.workdir).envs(&config.env);

        info!(
            command = %config.command,
            timeout_ms = config.timeout.as_millis() as u64,
            "starting headless agent"
        );
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            config.timeout,
            self.output_limit_bytes,
            Some(sink),
        )
        .map_err(|err| OrchestratorError::ExecutionFailed(format!("{err:#}")))?;

        let result = interpret_output(config.provider, config.timeout, &output);
        if result.success {
            info!(duration_ms = result.duration_ms, "headless agent finished");
        } else {
            warn!(
                exit_code = ?result.exit_code,
                timed_out = output.timed_out,
                "headless agent failed"
            );
        }
        Ok(ExecutionOutcome::Finished(result))
    }
}

/// Map captured process output to an execution result.
///
/// Success means exit code 0. Allowlisted stderr lines (usage banners) are
/// moved into the output instead of being reported as errors.
pub(crate) fn interpret_output(
    provider: Provider,
    timeout: Duration,
    output: &CommandOutput,
) -> ExecutionResult {
    let duration_ms = output.duration.as_millis() as u64;
    let (banner, stderr) = split_stderr(provider, &output.stderr_text());
    let mut text = output.stdout_text();
    if !banner.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&banner);
    }

    if output.timed_out {
        let timeout_err = OrchestratorError::ExecutionTimeout { timeout };
        let mut result = ExecutionResult::failed(
            text,
            join_nonempty(&timeout_err.to_string(), stderr.trim()),
            duration_ms,
        );
        result.exit_code = Some(output.exit_code);
        return result;
    }
    if let Some(spawn_error) = &output.spawn_error {
        let mut result = ExecutionResult::failed(text, spawn_error.clone(), duration_ms);
        result.exit_code = Some(output.exit_code);
        return result;
    }
    if output.exit_code == 0 {
        return ExecutionResult::succeeded(text, duration_ms);
    }

    let error = if stderr.trim().is_empty() {
        format!("agent exited with code {}", output.exit_code)
    } else {
        stderr.trim().to_string()
    };
    let mut result = ExecutionResult::failed(text, error, duration_ms);
    result.exit_code = Some(output.exit_code);
    result
}

/// Split stderr into (allowlisted banner lines, remaining lines).
fn split_stderr(provider: Provider, stderr: &str) -> (String, String) {
    let allowlist = provider.stderr_allowlist();
    let mut banner = String::new();
    let mut rest = String::new();
    for line in stderr.split_inclusive('\n') {
        if allowlist.iter().any(|marker| line.trim_start().starts_with(marker)) {
            banner.push_str(line);
        } else {
            rest.push_str(line);
        }
    }
    (banner, rest)
}

fn join_nonempty(head: &str, tail: &str) -> String {
    if tail.is_empty() {
        head.to_string()
    } else {
        format!("{head}\n{tail}")
    }
}
