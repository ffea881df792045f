//! Orchestrator configuration stored under `.taskpilot/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{AgentConfig, DispatchMode, Provider};

/// Orchestrator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that work
/// with the stock `claude`/`codex` CLIs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Timeout applied to headless executions without their own `timeout_secs`.
    pub default_timeout_secs: u64,

    /// Timeout for `--version` availability probes.
    pub probe_timeout_ms: u64,

    /// Keep at most this many bytes of stdout/stderr per execution.
    pub output_limit_bytes: usize,

    /// Replace every executor with the simulated one and skip availability checks.
    pub simulated: bool,

    /// Artificial delay for simulated executions.
    pub simulated_delay_ms: u64,

    /// Provider preference order used by `decide`.
    pub preferred: Vec<Provider>,

    /// Where terminal scripts and prompt files go. Relative to the workspace root.
    pub scratch_dir: Option<PathBuf>,

    pub completion: CompletionConfig,

    pub providers: ProvidersConfig,
}

/// One `[providers.<name>]` table per supported provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub claude: ProviderConfig,
    pub codex: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Claude => &self.claude,
            Provider::Codex => &self.codex,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        match provider {
            Provider::Claude => &mut self.claude,
            Provider::Codex => &mut self.codex,
        }
    }
}

/// Read-back policy after a detached terminal launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    pub poll_interval_ms: u64,
    /// Zero means "do not wait": the task goes to review right away.
    pub max_wait_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_wait_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub mode: DispatchMode,
    /// Binary to run. Defaults to the provider name.
    pub command: Option<String>,
    /// Arguments. Defaults depend on `mode`.
    pub args: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    /// Windows only: run the agent inside WSL.
    pub use_wsl: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Headless,
            command: None,
            args: None,
            env: BTreeMap::new(),
            timeout_secs: None,
            use_wsl: false,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: AgentConfig::DEFAULT_TIMEOUT.as_secs(),
            probe_timeout_ms: 5_000,
            output_limit_bytes: 1_000_000,
            simulated: false,
            simulated_delay_ms: 500,
            preferred: vec![Provider::Claude, Provider::Codex],
            scratch_dir: None,
            completion: CompletionConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(anyhow!("default_timeout_secs must be > 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(anyhow!("probe_timeout_ms must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.completion.poll_interval_ms == 0 {
            return Err(anyhow!("completion.poll_interval_ms must be > 0"));
        }
        for provider in Provider::ALL {
            let cfg = self.providers.get(provider);
            if cfg.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(anyhow!("providers.{provider}.command must not be empty"));
            }
            if cfg.timeout_secs == Some(0) {
                return Err(anyhow!("providers.{provider}.timeout_secs must be > 0"));
            }
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    /// Resolve the per-invocation agent settings for `provider`.
    pub fn agent_config(&self, provider: Provider) -> AgentConfig {
        let provider_cfg = self.providers.get(provider).clone();
        let mut agent = AgentConfig::for_provider(provider, provider_cfg.mode);
        if let Some(command) = provider_cfg.command {
            agent.command = command;
        }
        if let Some(args) = provider_cfg.args {
            agent.args = args;
        }
        agent.env = provider_cfg.env;
        agent.timeout =
            Duration::from_secs(provider_cfg.timeout_secs.unwrap_or(self.default_timeout_secs));
        agent.use_wsl = provider_cfg.use_wsl;
        agent
    }

    pub fn scratch_dir(&self, root: &Path) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(".taskpilot").join("scratch"),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
