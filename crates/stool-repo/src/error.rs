//! Error types for registry and reference operations

use stool_core::CoreError;
use thiserror::Error;

/// Registry and directions reference errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Reference Errors ============
    #[error("Invalid directions reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Invalid image reference: {reference}")]
    InvalidImage { reference: String },

    #[error("{origin}: {message}")]
    Resolve { origin: String, message: String },

    #[error("image does not have a '{label}' label: {image}")]
    MissingLabel { image: String, label: String },

    // ============ Registry Errors ============
    #[error("No tags found for {repository}")]
    NoTags { repository: String },

    #[error("Tag not found: {repository}:{tag}")]
    TagNotFound { repository: String, tag: String },

    #[error("invalid toolkit repository: {repository}")]
    InvalidToolkitRepository { repository: String },

    #[error("Registry error: {message}")]
    Registry { message: String },

    // ============ Wrapped Errors ============
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepoError {
    /// Attach the originating reference to an error raised while resolving it
    pub fn resolving(origin: &str, err: impl std::fmt::Display) -> Self {
        Self::Resolve {
            origin: origin.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RepoError>;
