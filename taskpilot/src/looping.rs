//! Multi-cycle driver for `taskpilot loop`.

use tracing::info;

use crate::engine::{ActReport, CycleOutcome, Engine};
use crate::error::{OrchestratorError, Outcome};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// No approved pending task is left.
    Idle,
    /// Every registered executor failed its availability probe.
    NoAgent,
    /// The configured cycle limit was reached.
    MaxCycles { max_cycles: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles_executed: u32,
    pub stop: LoopStop,
}

/// Run cycles until the queue is idle, no agent is available, or
/// `max_cycles` (when set) is reached.
///
/// Task failures do not stop the loop: they are already recorded on the task.
/// Any other error is returned immediately.
pub fn run_loop<F: FnMut(&ActReport)>(
    engine: &Engine,
    max_cycles: Option<u32>,
    mut on_cycle: F,
) -> Outcome<LoopOutcome> {
    let mut cycles_executed = 0u32;
    loop {
        if let Some(max_cycles) = max_cycles
            && cycles_executed >= max_cycles
        {
            return Ok(LoopOutcome {
                cycles_executed,
                stop: LoopStop::MaxCycles { max_cycles },
            });
        }

        match engine.run_cycle() {
            Ok(CycleOutcome::Executed(report)) => {
                cycles_executed += 1;
                on_cycle(&report);
            }
            Ok(CycleOutcome::Idle) => {
                info!(cycles_executed, "queue idle, stopping loop");
                return Ok(LoopOutcome {
                    cycles_executed,
                    stop: LoopStop::Idle,
                });
            }
            Err(OrchestratorError::NoAgentAvailable) => {
                return Ok(LoopOutcome {
                    cycles_executed,
                    stop: LoopStop::NoAgent,
                });
            }
            Err(err) => return Err(err),
        }
    }
}
