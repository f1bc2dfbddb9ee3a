//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{subject}: duplicate direction: {name}")]
    DuplicateDirection { subject: String, name: String },

    #[error("unknown direction: {name}")]
    UnknownDirection { name: String },

    #[error("{name}: malformed expression: {node}")]
    MalformedExpression { name: String, node: String },

    #[error("{subject}: cannot override private direction: {name}")]
    PrivateOverride { subject: String, name: String },

    #[error("direction '{name}' is marked extra by more than one bundle: {first}, {second}")]
    ExtraNotUnique {
        name: String,
        first: String,
        second: String,
    },

    #[error("ambiguous chart: {first} vs {second}")]
    AmbiguousChart { first: String, second: String },

    #[error("cyclic directions inheritance: {cycle}")]
    InheritanceCycle { cycle: String },

    #[error("directions not found: {name}")]
    DirectionsNotFound { name: String },

    #[error("duplicate directions: {name}")]
    DuplicateDirections { name: String },

    #[error("chart not found: {name}")]
    ChartNotFound { name: String },

    #[error("duplicate chart: {name}")]
    DuplicateChart { name: String },

    #[error("unknown environment variable: {name}")]
    UnknownEnvironment { name: String },

    #[error("Invalid directions document: {message}")]
    InvalidDocument { message: String },

    #[error("Invalid toolkit: {message}")]
    InvalidToolkit { message: String },

    #[error("Invalid --set format: {input}. Expected key=value")]
    InvalidSet { input: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
