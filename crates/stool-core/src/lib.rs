//! stool Core - configuration types for stages
//!
//! This crate provides the foundational types used throughout stool:
//! - `Direction`: a named value definition (literal value or expression)
//! - `Directions`: an inheritable, ordered bundle of directions
//! - `Toolkit`: the catalogue of builtin directions, charts and scripts
//! - `Values`: the resolved name to value map
//! - `Diff`: changes between two resolved maps

pub mod diff;
pub mod direction;
pub mod directions;
pub mod error;
pub mod script;
pub mod toolkit;
pub mod values;

pub use diff::{Change, Diff};
pub use direction::{Direction, VALUE_PREFIX, to_expression};
pub use directions::Directions;
pub use error::{CoreError, Result};
pub use script::Script;
pub use toolkit::{Chart, Toolkit, ToolkitFile};
pub use values::{DIRECTIONS_VALUE, Values, parse_set_values};
