//! I/O helpers for generator commands.

pub mod atomic;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod history_store;
pub mod pipeline_host;
pub mod process;
pub mod prompt;
pub mod sandbox;
