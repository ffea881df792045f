//! Shared deterministic types for orchestrator core logic.
//!
//! These types define stable contracts between the engine, the executor
//! variants and the process layer. They hold no I/O handles.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// External AI coding-agent backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Claude, Provider::Codex];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
        }
    }

    /// Binary name used when no command is configured.
    pub fn default_command(self) -> &'static str {
        self.as_str()
    }

    /// Default arguments for a dispatch mode.
    ///
    /// Headless arguments make the binary read the prompt from stdin and exit.
    /// Terminal sessions start the interactive agent with the prompt appended.
    pub fn default_args(self, mode: DispatchMode) -> Vec<String> {
        let args: &[&str] = match (self, mode) {
            (Provider::Claude, DispatchMode::Headless) => {
                &["--print", "--dangerously-skip-permissions"]
            }
            (Provider::Codex, DispatchMode::Headless) => &[
                "exec",
                "--sandbox",
                "workspace-write",
                "--skip-git-repo-check",
                "-",
            ],
            _ => &[],
        };
        args.iter().map(|arg| arg.to_string()).collect()
    }

    /// Stderr markers that are usage banners rather than failures.
    pub fn stderr_allowlist(self) -> &'static [&'static str] {
        match self {
            Provider::Claude => &["Usage: claude", "Options:", "Commands:"],
            Provider::Codex => &["Usage: codex", "Reading prompt from stdin", "workdir:"],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            other => Err(anyhow!("unknown provider '{other}' (expected claude|codex)")),
        }
    }
}

/// How a provider's tasks are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Headless,
    Terminal,
    Simulated,
    FileOp,
}

impl DispatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchMode::Headless => "headless",
            DispatchMode::Terminal => "terminal",
            DispatchMode::Simulated => "simulated",
            DispatchMode::FileOp => "file_op",
        }
    }
}

/// Per-invocation agent settings. Never stored globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub provider: Provider,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    /// Route the command through `wsl` on Windows.
    pub use_wsl: bool,
}

impl AgentConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn for_provider(provider: Provider, mode: DispatchMode) -> Self {
        Self {
            provider,
            command: provider.default_command().to_string(),
            args: provider.default_args(mode),
            env: BTreeMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            use_wsl: false,
        }
    }
}

/// Result of a finished execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub files_modified: Option<Vec<String>>,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration_ms,
            exit_code: Some(0),
            files_modified: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
            duration_ms,
            exit_code: None,
            files_modified: None,
        }
    }

    /// Text persisted to the task when the execution did not succeed.
    pub fn failure_text(&self) -> String {
        match self.error.as_deref().map(str::trim) {
            Some(err) if !err.is_empty() => err.to_string(),
            _ if !self.output.trim().is_empty() => self.output.clone(),
            _ => format!("execution failed (exit code {:?})", self.exit_code),
        }
    }
}

/// What an executor reports back once its work is handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The work ran to completion under our supervision.
    Finished(ExecutionResult),
    /// A detached terminal was opened; completion is unknown to us.
    Launched {
        script_path: PathBuf,
        launcher: String,
    },
}

/// Which child stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A piece of streamed executor output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub text: String,
}

/// Derived scoring of a task. Every field lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskAssessment {
    pub urgency: f64,
    pub complexity: f64,
    pub business_impact: f64,
    pub overall_criticality: f64,
}
