//! Error types for stool-kube

use stool_core::{CoreError, Diff};
use stool_engine::EngineError;
use thiserror::Error;

/// Result type for stool-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during cluster and publish operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Command inside a pod failed
    #[error("pod '{pod}': command failed: {message}")]
    Exec { pod: String, message: String },

    /// Pod did not become ready
    #[error("pod '{pod}' not running after {seconds}s")]
    PodTimeout { pod: String, seconds: u64 },

    /// Directions without a chart cannot be published
    #[error("directions without chart: {subject}")]
    NoChart { subject: String },

    /// Changes outside the allow-list
    #[error("change is forbidden:\n{diff}")]
    ForbiddenChange { diff: Diff },

    /// Packaging tool invocation failed
    #[error("helm failed: {message}")]
    Packaging { message: String },

    /// No cluster connection where one is required
    #[error("toolkit image {image} requires a cluster connection")]
    NoCluster { image: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }
}
