//! Script execution in short-lived toolkit pods
//!
//! Every script call gets its own pod running the toolkit image: the working
//! directory is uploaded, the script runs, the working directory comes back
//! and the pod is deleted. [`PodGuard`] deletes the pod on every exit path;
//! if the call unwinds before the guard is released, the delete runs as a
//! detached task on the captured runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rand::Rng;
use stool_core::{Script, Toolkit};
use stool_engine::{EngineError, Executor, ProcessExecutor, STORAGE, SharedExecutor, shared};
use tempfile::TempDir;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::engine::{ClusterEngine, PodRequest};
use crate::error::{KubeError, Result};

/// Container name inside toolkit pods
pub const CONTAINER: &str = "toolkit";

/// Where the toolkit image ships its scripts
pub const SCRIPTS_PATH: &str = "/usr/local/toolkit/scripts";

/// Where the working directory is mounted inside the pod
pub const WORKING_PATH: &str = "/usr/local/working";

/// Runs scripts in pods through a [`ClusterEngine`]
pub struct PodExecutor {
    engine: Arc<dyn ClusterEngine>,
    runtime: Handle,
    image: String,
    environment: IndexMap<String, String>,
    working: PathBuf,
    _scope: Option<TempDir>,
}

impl PodExecutor {
    pub fn new(
        engine: Arc<dyn ClusterEngine>,
        runtime: Handle,
        image: impl Into<String>,
        environment: IndexMap<String, String>,
        working: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            runtime,
            image: image.into(),
            environment,
            working: working.into(),
            _scope: None,
        }
    }

    /// Executor with a fresh working directory that is removed when the executor is dropped
    pub fn scoped(
        engine: Arc<dyn ClusterEngine>,
        runtime: Handle,
        image: impl Into<String>,
        environment: IndexMap<String, String>,
    ) -> Result<Self> {
        let scope = tempfile::Builder::new().prefix("stool-working-").tempdir()?;
        let mut executor = Self::new(engine, runtime, image, environment, scope.path());
        executor._scope = Some(scope);
        Ok(executor)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    async fn exec_in_pod(&self, script: &Script, args: &[String]) -> Result<String> {
        let mut request = PodRequest::new(pod_name(), &self.image, CONTAINER);
        request.command = vec!["sleep".to_string(), "3600".to_string()];
        request.environment = self.environment.clone();
        request.working_dir = Some(WORKING_PATH.to_string());

        debug!(pod = %request.name, script = %script.name, "starting toolkit pod");
        let guard = PodGuard::new(self.engine.clone(), self.runtime.clone(), &request.name);
        let outcome = match self.engine.pod_create(&request).await {
            Ok(()) => self.run(&request.name, script, args).await,
            Err(e) => Err(e),
        };
        let released = guard.release().await;

        match (outcome, released) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(pod = %request.name, error = %cleanup, "failed to delete toolkit pod");
                Err(e)
            }
        }
    }

    async fn run(&self, pod: &str, script: &Script, args: &[String]) -> Result<String> {
        self.engine
            .pod_upload(pod, CONTAINER, &self.working, WORKING_PATH)
            .await?;

        let mut command = vec![format!("{SCRIPTS_PATH}/{}", script.file_name())];
        for arg in args {
            if arg == STORAGE {
                let storage = format!("{WORKING_PATH}/{}", script.name);
                let mkdir = vec!["mkdir".to_string(), "-p".to_string(), storage.clone()];
                self.engine.pod_exec(pod, CONTAINER, &mkdir).await?;
                command.push(storage);
            } else {
                command.push(arg.clone());
            }
        }

        debug!(pod, ?command, "running script");
        let output = self.engine.pod_exec(pod, CONTAINER, &command).await?;
        self.engine
            .pod_download(pod, CONTAINER, WORKING_PATH, &self.working)
            .await?;
        Ok(output)
    }
}

impl Executor for PodExecutor {
    fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    fn working(&self) -> &Path {
        &self.working
    }

    fn exec(&mut self, script: &Script, args: &[String]) -> stool_engine::Result<String> {
        self.runtime
            .block_on(self.exec_in_pod(script, args))
            .map_err(|e| EngineError::ScriptFailed {
                script: script.name.clone(),
                message: e.to_string(),
            })
    }
}

/// Deletes a pod when dropped unless released
struct PodGuard {
    engine: Arc<dyn ClusterEngine>,
    runtime: Handle,
    pod: String,
    armed: bool,
}

impl PodGuard {
    fn new(engine: Arc<dyn ClusterEngine>, runtime: Handle, pod: &str) -> Self {
        Self {
            engine,
            runtime,
            pod: pod.to_string(),
            armed: true,
        }
    }

    async fn release(mut self) -> Result<()> {
        self.armed = false;
        self.engine.pod_delete(&self.pod).await
    }
}

impl Drop for PodGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(pod = %self.pod, "toolkit pod abandoned, deleting in background");
        let engine = self.engine.clone();
        let pod = std::mem::take(&mut self.pod);
        self.runtime.spawn(async move {
            if let Err(e) = engine.pod_delete(&pod).await {
                error!(pod = %pod, error = %e, "failed to delete toolkit pod");
            }
        });
    }
}

fn pod_name() -> String {
    format!("stool-toolkit-{:08x}", rand::rng().random::<u32>())
}

/// Pick the script backend for a toolkit: a pod when the toolkit names an image, a process otherwise.
///
/// Both backends get a scoped working directory, so state written by scripts
/// lives as long as the returned executor.
pub fn executor_for(
    toolkit: &Toolkit,
    cluster: Option<(Arc<dyn ClusterEngine>, Handle)>,
) -> Result<SharedExecutor> {
    let environment = toolkit.environment().clone();
    match (toolkit.image(), cluster) {
        (Some(image), Some((engine, runtime))) => {
            debug!(image, "scripts run in toolkit pods");
            Ok(shared(PodExecutor::scoped(engine, runtime, image, environment)?))
        }
        (Some(image), None) => Err(KubeError::NoCluster {
            image: image.to_string(),
        }),
        (None, _) => Ok(shared(ProcessExecutor::scoped(environment)?)),
    }
}
