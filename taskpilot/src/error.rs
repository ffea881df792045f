//! Error taxonomy for the orchestrator boundary.
//!
//! Every fallible engine and executor call returns [`Outcome`]. Executors never
//! let these escape as panics; the engine folds execution failures into task
//! state and only returns `Err` for conditions the caller must act on.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::Provider;
use crate::task::TaskStatus;

/// Result alias used across the orchestrator.
pub type Outcome<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no agent available: every registered executor failed its availability probe")]
    NoAgentAvailable,

    #[error("provider selection cancelled")]
    SelectionCancelled,

    #[error("execution timed out after {}ms", .timeout.as_millis())]
    ExecutionTimeout { timeout: Duration },

    #[error("no executor registered for provider '{0}'")]
    ExecutorNotRegistered(Provider),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("task '{id}' cannot move from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task '{0}' already has an execution in flight")]
    AlreadyRunning(String),

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("task repository error: {0:#}")]
    Repository(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_timeout() {
        let err = OrchestratorError::ExecutionTimeout {
            timeout: Duration::from_millis(100),
        };
        assert_eq!(err.to_string(), "execution timed out after 100ms");
    }

    #[test]
    fn transition_message_uses_wire_names() {
        let err = OrchestratorError::InvalidTransition {
            id: "t1".to_string(),
            from: TaskStatus::Completed,
            to: TaskStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "task 't1' cannot move from COMPLETED to IN_PROGRESS"
        );
    }
}
