//! Self-improving generator of multi-agent problem-solving pipelines.
//!
//! Each cycle asks a model for a candidate pipeline, runs it against a fixed
//! benchmark under repeated trials, and appends the measured record to an
//! append-only history that conditions the next generation. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (statistics, selection,
//!   classification, response parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, child processes,
//!   completion backends). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`accuracy`], [`pipeline`], [`curator`],
//! [`orchestrator`], [`looping`]) coordinate core logic with I/O to implement
//! CLI commands.

pub mod accuracy;
pub mod core;
pub mod curator;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod orchestrator;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
