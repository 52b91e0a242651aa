//! Deterministic, pure logic shared by the generator loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod entry_point;
pub mod excerpts;
pub mod ids;
pub mod record;
pub mod response;
pub mod selector;
pub mod stats;
pub mod types;
pub mod value_match;
