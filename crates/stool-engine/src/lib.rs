//! stool Engine - evaluation of directions into values
//!
//! This crate provides a MiniJinja-based evaluator with:
//! - `${ ... }` expressions with lazy cross references between directions
//! - Memoization and cycle detection per evaluation session
//! - Script calls through a pluggable [`Executor`]
//! - Human-readable error messages with suggestions

pub mod engine;
pub mod error;
pub mod executor;
pub mod filters;
pub mod functions;
pub mod suggestions;

pub use engine::{Evaluator, EvaluatorBuilder, StageInfo};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use executor::{Executor, ProcessExecutor, STORAGE, SharedExecutor, shared};
pub use suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};
