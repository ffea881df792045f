//! I/O helpers: configuration, task storage, processes and terminals.

pub mod config;
pub mod init;
pub mod platform;
pub mod process;
pub mod prompt;
pub mod scratch;
pub mod task_store;
pub mod terminal;
