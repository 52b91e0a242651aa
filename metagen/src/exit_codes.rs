//! Stable exit codes for `metagen` commands.

/// Command succeeded. For `run`, individual iterations may still have failed.
pub const OK: i32 = 0;
/// Command failed due to invalid config, catalog, arguments, or other errors.
pub const INVALID: i32 = 1;
/// The history file could not be written; results were not persisted.
pub const PERSISTENCE: i32 = 2;
