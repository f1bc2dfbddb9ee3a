//! CLI error types with exit code handling
//!
//! Library errors are sorted into the categories users act on: fix the
//! definitions, fix an expression or script, fix a reference, widen the
//! allow-list, or look at the cluster.

use miette::Diagnostic;
use stool_core::CoreError;
use stool_engine::{EngineError, TemplateError};
use stool_kube::KubeError;
use stool_repo::RepoError;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid directions, toolkit or overrides
    #[error("Definition error: {message}")]
    #[diagnostic(code(stool::cli::definition))]
    Definition {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An expression failed, with its source
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(TemplateError),

    /// Evaluation failed outside a template
    #[error("Evaluation failed: {message}")]
    #[diagnostic(code(stool::cli::evaluation))]
    Evaluation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A directions reference could not be loaded
    #[error("Resolution failed: {message}")]
    #[diagnostic(code(stool::cli::resolution))]
    Resolution { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(stool::cli::forbidden),
        help("pass the keys with --allow to accept these changes")
    )]
    Forbidden { message: String },

    /// Cluster, registry connection or packaging tool failure
    #[error("Cluster error: {message}")]
    #[diagnostic(code(stool::cli::cluster))]
    Cluster { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(stool::cli::io))]
    Io { message: String },

    /// Invalid command line or settings
    #[error("{message}")]
    #[diagnostic(code(stool::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Definition { .. } => exit_codes::DEFINITION_ERROR,
            CliError::Template(_) | CliError::Evaluation { .. } => exit_codes::EVALUATION_ERROR,
            CliError::Resolution { .. } => exit_codes::RESOLUTION_ERROR,
            CliError::Forbidden { .. } => exit_codes::FORBIDDEN_CHANGE,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Usage { .. } => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
            help: None,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::DirectionsNotFound { .. } | CoreError::ChartNotFound { .. } => {
                CliError::Resolution {
                    message: err.to_string(),
                }
            }
            CoreError::InvalidSet { .. } => CliError::usage_with_help(
                err.to_string(),
                "use --set name=value, the value may contain '='",
            ),
            CoreError::UnknownDirection { .. } => CliError::Definition {
                message: err.to_string(),
                help: Some("run `stool describe` to list the directions".to_string()),
            },
            other => CliError::definition(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(e) => CliError::Template(e),
            EngineError::Core(e) => e.into(),
            EngineError::Io(e) => e.into(),
            EngineError::UnknownDirection {
                ref suggestion, ..
            } => CliError::Evaluation {
                help: suggestion.clone(),
                message: err.to_string(),
            },
            other => CliError::Evaluation {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Core(e) => e.into(),
            RepoError::Io(e) => e.into(),
            RepoError::Registry { .. } => CliError::Cluster {
                message: err.to_string(),
            },
            RepoError::InvalidToolkitRepository { .. } => CliError::usage(err.to_string()),
            other => CliError::Resolution {
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(e) => e.into(),
            KubeError::Engine(e) => e.into(),
            KubeError::Io(e) => e.into(),
            KubeError::ForbiddenChange { .. } => CliError::Forbidden {
                message: err.to_string(),
            },
            KubeError::NoChart { .. } => CliError::definition(err.to_string()),
            other => CliError::Cluster {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::usage(format!("invalid YAML: {err}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io {
            message: format!("JSON output failed: {err}"),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use stool_core::Diff;

    #[test]
    fn test_exit_codes_by_category() {
        let unknown: CliError = CoreError::UnknownDirection {
            name: "x".to_string(),
        }
        .into();
        assert_eq!(unknown.exit_code(), exit_codes::DEFINITION_ERROR);

        let cycle: CliError = EngineError::Cycle {
            name: "a".to_string(),
        }
        .into();
        assert_eq!(cycle.exit_code(), exit_codes::EVALUATION_ERROR);

        let missing: CliError = RepoError::Core(CoreError::DirectionsNotFound {
            name: "x".to_string(),
        })
        .into();
        assert_eq!(missing.exit_code(), exit_codes::RESOLUTION_ERROR);

        let forbidden: CliError = KubeError::ForbiddenChange { diff: Diff::new() }.into();
        assert_eq!(forbidden.exit_code(), exit_codes::FORBIDDEN_CHANGE);

        let nested: CliError = KubeError::Engine(EngineError::Core(CoreError::InvalidSet {
            input: "x".to_string(),
        }))
        .into();
        assert!(matches!(nested, CliError::Usage { .. }));
    }
}
