//! Exit codes for CLI operations
//!
//! Codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Definition error - invalid directions, toolkit or override
pub const DEFINITION_ERROR: i32 = 2;

/// Evaluation error - an expression or script failed
pub const EVALUATION_ERROR: i32 = 3;

/// Resolution error - a directions reference could not be loaded
pub const RESOLUTION_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// A change outside the allow-list was rejected
pub const FORBIDDEN_CHANGE: i32 = 6;

/// Cluster or packaging tool failure
pub const CLUSTER_ERROR: i32 = 7;
