//! Provider -> executor lookup, built once from configuration and passed
//! around explicitly.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info};

use crate::core::types::{DispatchMode, Provider};
use crate::error::{OrchestratorError, Outcome};
use crate::io::config::OrchestratorConfig;

use super::{
    AgentExecutor, ExecutorEnv, FileOpExecutor, HeadlessExecutor, SimulatedExecutor,
    TerminalExecutor,
};

/// Registered executors, iterated in provider order.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: RwLock<BTreeMap<Provider, AgentExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executors(executors: impl IntoIterator<Item = AgentExecutor>) -> Self {
        let registry = Self::new();
        registry.swap_all(executors);
        registry
    }

    /// One executor per provider, shaped by each provider's configured mode.
    ///
    /// With `simulated` set every provider gets a simulated executor.
    pub fn from_config(cfg: &OrchestratorConfig, env: &ExecutorEnv) -> Self {
        let executors = Provider::ALL.into_iter().map(|provider| {
            let mode = if cfg.simulated {
                DispatchMode::Simulated
            } else {
                cfg.providers.get(provider).mode
            };
            let agent = cfg.agent_config(provider);
            match mode {
                DispatchMode::Headless => AgentExecutor::Headless(
                    HeadlessExecutor::new(agent, env)
                        .with_probe_timeout(cfg.probe_timeout())
                        .with_output_limit(cfg.output_limit_bytes),
                ),
                DispatchMode::Terminal => AgentExecutor::Terminal(
                    TerminalExecutor::new(agent, env).with_probe_timeout(cfg.probe_timeout()),
                ),
                DispatchMode::Simulated => AgentExecutor::Simulated(
                    SimulatedExecutor::new(provider).with_delay(cfg.simulated_delay()),
                ),
                DispatchMode::FileOp => {
                    AgentExecutor::FileOp(FileOpExecutor::new(provider, &env.workdir))
                }
            }
        });
        let registry = Self::with_executors(executors);
        info!(
            providers = ?registry.providers(),
            simulated = cfg.simulated,
            "executor registry built"
        );
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Provider, AgentExecutor>> {
        self.executors.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or replace the executor for its provider. Returns the previous one.
    pub fn register(&self, executor: AgentExecutor) -> Option<AgentExecutor> {
        let provider = executor.provider();
        debug!(%provider, mode = executor.mode().as_str(), "registering executor");
        self.executors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, executor)
    }

    /// Replace every registration at once.
    pub fn swap_all(&self, executors: impl IntoIterator<Item = AgentExecutor>) {
        let next: BTreeMap<Provider, AgentExecutor> =
            executors.into_iter().map(|e| (e.provider(), e)).collect();
        *self
            .executors
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn get(&self, provider: Provider) -> Outcome<AgentExecutor> {
        self.read()
            .get(&provider)
            .cloned()
            .ok_or(OrchestratorError::ExecutorNotRegistered(provider))
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.read().keys().copied().collect()
    }

    /// Providers whose executor passes its availability probe.
    ///
    /// Probes run outside the lock since they may spawn processes.
    pub fn available(&self) -> Vec<Provider> {
        let snapshot: Vec<AgentExecutor> = self.read().values().cloned().collect();
        snapshot
            .into_iter()
            .filter(|executor| executor.is_available())
            .map(|executor| executor.provider())
            .collect()
    }
}
