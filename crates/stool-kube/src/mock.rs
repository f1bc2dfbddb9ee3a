//! In-memory cluster for testing
//!
//! Each pod gets a directory under the mock root standing in for its
//! filesystem. Uploads and downloads go through the same tar streams as the
//! real engine. Commands other than `mkdir -p` are handed to an exec handler.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::archive;
use crate::engine::{ClusterEngine, PodRequest};
use crate::error::{KubeError, Result};

/// A running mock pod, as seen by an exec handler
#[derive(Debug, Clone)]
pub struct MockPod {
    pub name: String,
    pub root: PathBuf,
    pub environment: Vec<(String, String)>,
}

impl MockPod {
    /// Host path standing in for a path inside the pod
    pub fn path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

pub type ExecHandler = Arc<dyn Fn(&MockPod, &[String]) -> Result<String> + Send + Sync>;

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub pod_creates: usize,
    pub pod_execs: usize,
    pub uploads: usize,
    pub downloads: usize,
    pub pod_deletes: usize,
    pub access_creates: usize,
    pub access_deletes: usize,
}

#[derive(Default)]
struct MockState {
    pods: BTreeMap<String, MockPod>,
    history: Vec<PodRequest>,
    service_accounts: BTreeSet<String>,
    roles: BTreeMap<String, Vec<String>>,
    bindings: BTreeMap<String, (String, String)>,
    operations: OperationCounts,
    fail_pod_create: bool,
    failing_access: BTreeSet<AccessCall>,
}

/// Access-control calls of [`ClusterEngine`] that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessCall {
    ServiceAccountCreate,
    ServiceAccountDelete,
    RoleCreate,
    RoleDelete,
    BindingCreate,
    BindingDelete,
}

impl AccessCall {
    pub const DELETES: [AccessCall; 3] = [
        AccessCall::ServiceAccountDelete,
        AccessCall::RoleDelete,
        AccessCall::BindingDelete,
    ];
}

/// Cluster engine backed by local directories
#[derive(Clone)]
pub struct MockClusterEngine {
    root: PathBuf,
    state: Arc<RwLock<MockState>>,
    handler: ExecHandler,
}

impl MockClusterEngine {
    /// Pods live in subdirectories of `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Arc::default(),
            handler: Arc::new(|_, _| Ok(String::new())),
        }
    }

    pub fn with_exec_handler(
        mut self,
        handler: impl Fn(&MockPod, &[String]) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Make every following pod creation fail
    pub fn fail_pod_create(&self, fail: bool) {
        self.write(|s| s.fail_pod_create = fail);
    }

    /// Make every following `call` fail with a forbidden API error
    pub fn fail_access(&self, call: AccessCall, fail: bool) {
        self.write(|s| {
            if fail {
                s.failing_access.insert(call);
            } else {
                s.failing_access.remove(&call);
            }
        });
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.read(|s| s.operations.clone())
    }

    /// Names of pods created and not yet deleted
    pub fn live_pods(&self) -> Vec<String> {
        self.read(|s| s.pods.keys().cloned().collect())
    }

    /// Every pod request received, in order
    pub fn created_pods(&self) -> Vec<PodRequest> {
        self.read(|s| s.history.clone())
    }

    pub fn service_accounts(&self) -> Vec<String> {
        self.read(|s| s.service_accounts.iter().cloned().collect())
    }

    pub fn roles(&self) -> BTreeMap<String, Vec<String>> {
        self.read(|s| s.roles.clone())
    }

    pub fn bindings(&self) -> BTreeMap<String, (String, String)> {
        self.read(|s| s.bindings.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Count the call and apply `f`, unless `call` is set to fail
    fn access(&self, call: AccessCall, name: &str, f: impl FnOnce(&mut MockState)) -> Result<()> {
        self.write(|s| {
            if matches!(
                call,
                AccessCall::ServiceAccountCreate | AccessCall::RoleCreate | AccessCall::BindingCreate
            ) {
                s.operations.access_creates += 1;
            } else {
                s.operations.access_deletes += 1;
            }
            if s.failing_access.contains(&call) {
                return Err(forbidden(name));
            }
            f(s);
            Ok(())
        })
    }

    fn pod(&self, name: &str) -> Result<MockPod> {
        self.read(|s| s.pods.get(name).cloned())
            .ok_or_else(|| KubeError::Exec {
                pod: name.to_string(),
                message: "pod not found".to_string(),
            })
    }
}

#[async_trait]
impl ClusterEngine for MockClusterEngine {
    async fn pod_create(&self, request: &PodRequest) -> Result<()> {
        let pod = MockPod {
            name: request.name.clone(),
            root: self.root.join(&request.name),
            environment: request
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let (failing, exists) = self.write(|s| {
            s.operations.pod_creates += 1;
            s.history.push(request.clone());
            (s.fail_pod_create, s.pods.contains_key(&request.name))
        });
        if failing || exists {
            return Err(KubeError::Exec {
                pod: request.name.clone(),
                message: if exists { "pod already exists" } else { "image pull failed" }.to_string(),
            });
        }
        fs::create_dir_all(&pod.root)?;
        if let Some(dir) = &request.working_dir {
            fs::create_dir_all(pod.path(dir))?;
        }
        self.write(|s| s.pods.insert(request.name.clone(), pod));
        Ok(())
    }

    async fn pod_exec(&self, pod: &str, _container: &str, command: &[String]) -> Result<String> {
        self.write(|s| s.operations.pod_execs += 1);
        let pod = self.pod(pod)?;
        if let [mkdir, flag, dir] = command
            && mkdir == "mkdir"
            && flag == "-p"
        {
            fs::create_dir_all(pod.path(dir))?;
            return Ok(String::new());
        }
        (self.handler)(&pod, command)
    }

    async fn pod_upload(&self, pod: &str, _container: &str, source: &Path, destination: &str) -> Result<()> {
        self.write(|s| s.operations.uploads += 1);
        let pod = self.pod(pod)?;
        let data = archive::pack_dir(source)?;
        archive::unpack_replacing(&data, &pod.path(destination))?;
        Ok(())
    }

    async fn pod_download(&self, pod: &str, _container: &str, source: &str, destination: &Path) -> Result<()> {
        self.write(|s| s.operations.downloads += 1);
        let pod = self.pod(pod)?;
        let data = archive::pack_dir(&pod.path(source))?;
        archive::unpack_replacing(&data, destination)?;
        Ok(())
    }

    async fn pod_delete(&self, pod: &str) -> Result<()> {
        let removed = self.write(|s| {
            s.operations.pod_deletes += 1;
            s.pods.remove(pod)
        });
        if let Some(pod) = removed
            && pod.root.exists()
        {
            fs::remove_dir_all(&pod.root)?;
        }
        Ok(())
    }

    async fn service_account_create(&self, name: &str) -> Result<()> {
        self.access(AccessCall::ServiceAccountCreate, name, |s| {
            s.service_accounts.insert(name.to_string());
        })
    }

    async fn service_account_delete(&self, name: &str) -> Result<()> {
        self.access(AccessCall::ServiceAccountDelete, name, |s| {
            s.service_accounts.remove(name);
        })
    }

    async fn role_create(&self, name: &str, pods: &[String]) -> Result<()> {
        self.access(AccessCall::RoleCreate, name, |s| {
            s.roles.insert(name.to_string(), pods.to_vec());
        })
    }

    async fn role_delete(&self, name: &str) -> Result<()> {
        self.access(AccessCall::RoleDelete, name, |s| {
            s.roles.remove(name);
        })
    }

    async fn binding_create(&self, name: &str, role: &str, service_account: &str) -> Result<()> {
        self.access(AccessCall::BindingCreate, name, |s| {
            s.bindings
                .insert(name.to_string(), (role.to_string(), service_account.to_string()));
        })
    }

    async fn binding_delete(&self, name: &str) -> Result<()> {
        self.access(AccessCall::BindingDelete, name, |s| {
            s.bindings.remove(name);
        })
    }
}

fn forbidden(name: &str) -> KubeError {
    KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{name}: forbidden"),
        reason: "Forbidden".to_string(),
        code: 403,
    }))
}
