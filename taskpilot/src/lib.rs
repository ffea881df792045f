//! Task execution orchestrator for external AI coding agents.
//!
//! Tasks live in a repository; the [`engine::Engine`] repeatedly observes the
//! queue, scores the next approved task, picks an available provider and hands
//! the task to that provider's executor. The architecture keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, scoring, parsing,
//!   script rendering). No I/O.
//! - **[`io`]**: Side-effecting operations (config, task store, processes,
//!   terminals, scratch files).
//!
//! [`agents`] builds the executor variants on top of both, and [`engine`]
//! coordinates them with the task store and the [`events`] bus.

pub mod agents;
pub mod core;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
