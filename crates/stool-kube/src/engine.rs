//! Cluster operations used by stool
//!
//! [`ClusterEngine`] is the seam between stool and Kubernetes: the pod
//! executor and the access cleanup only talk to this trait.
//! [`KubeEngine`](crate::client::KubeEngine) implements it with kube-rs,
//! [`MockClusterEngine`](crate::mock::MockClusterEngine) in memory.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::Result;

/// Label put on every pod stool creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Everything needed to start a single-container pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRequest {
    pub name: String,
    pub image: String,
    pub container: String,
    pub command: Vec<String>,
    pub environment: IndexMap<String, String>,
    pub working_dir: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl PodRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>, container: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "stool".to_string());
        Self {
            name: name.into(),
            image: image.into(),
            container: container.into(),
            command: Vec::new(),
            environment: IndexMap::new(),
            working_dir: None,
            labels,
        }
    }
}

#[async_trait]
pub trait ClusterEngine: Send + Sync {
    /// Create a pod and wait until it is running
    async fn pod_create(&self, request: &PodRequest) -> Result<()>;

    /// Run a command in a container, returning its standard output
    async fn pod_exec(&self, pod: &str, container: &str, command: &[String]) -> Result<String>;

    /// Copy the contents of a local directory into a container directory
    async fn pod_upload(&self, pod: &str, container: &str, source: &Path, destination: &str) -> Result<()>;

    /// Replace the contents of a local directory with a container directory
    async fn pod_download(&self, pod: &str, container: &str, source: &str, destination: &Path) -> Result<()>;

    /// Delete a pod immediately; deleting a missing pod succeeds
    async fn pod_delete(&self, pod: &str) -> Result<()>;

    async fn service_account_create(&self, name: &str) -> Result<()>;

    async fn service_account_delete(&self, name: &str) -> Result<()>;

    /// Create a role allowing exec into the given pods
    async fn role_create(&self, name: &str, pods: &[String]) -> Result<()>;

    async fn role_delete(&self, name: &str) -> Result<()>;

    async fn binding_create(&self, name: &str, role: &str, service_account: &str) -> Result<()>;

    async fn binding_delete(&self, name: &str) -> Result<()>;
}
