//! Kubernetes implementation of [`ClusterEngine`]

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, AttachParams, DeleteParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::runtime::wait::{await_condition, conditions};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::archive;
use crate::engine::{ClusterEngine, MANAGED_BY_LABEL, PodRequest};
use crate::error::{KubeError, Result};

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Cluster engine talking to the Kubernetes API
pub struct KubeEngine {
    client: kube::Client,
    namespace: String,
    ready_timeout: Duration,
}

impl KubeEngine {
    /// Connect using the kubeconfig, or the in-cluster config when no context is given
    pub async fn connect(context: Option<&str>, namespace: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| KubeError::InvalidConfig(e.to_string()))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| KubeError::InvalidConfig(e.to_string()))?,
        };
        let namespace = namespace
            .map(str::to_string)
            .unwrap_or_else(|| config.default_namespace.clone());
        let client = kube::Client::try_from(config)?;
        debug!(namespace = %namespace, "connected to cluster");
        Ok(Self::with_client(client, namespace))
    }

    /// Create with an existing Kubernetes client
    pub fn with_client(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// How long to wait for a created pod to be running
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "stool".to_string());
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        }
    }

    /// Run a command, optionally feeding stdin, and collect raw stdout
    async fn exec_raw(
        &self,
        pod: &str,
        container: &str,
        command: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let failed = |message: String| KubeError::Exec {
            pod: pod.to_string(),
            message,
        };
        let params = AttachParams::default()
            .container(container)
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        let pods: Api<Pod> = self.api();
        let mut attached = pods.exec(pod, command.to_vec(), &params).await?;

        if let Some(data) = stdin {
            let mut writer = attached
                .stdin()
                .ok_or_else(|| failed("stdin not attached".to_string()))?;
            writer.write_all(&data).await?;
            writer.shutdown().await?;
        }

        let status = attached.take_status();
        let (stdout, stderr) = (attached.stdout(), attached.stderr());
        let (stdout, stderr) = futures::join!(read_all(stdout), read_all(stderr));
        let (stdout, stderr) = (stdout?, stderr?);
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        attached.join().await.map_err(|e| failed(e.to_string()))?;

        if let Some(status) = status
            && status.status.as_deref() == Some("Failure")
        {
            let mut message = status.message.unwrap_or_else(|| "command failed".to_string());
            let stderr = String::from_utf8_lossy(&stderr);
            if !stderr.trim().is_empty() {
                message = format!("{message}: {}", stderr.trim());
            }
            return Err(failed(message));
        }
        Ok(stdout)
    }
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn delete_named<K>(api: Api<K>, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    let params = DeleteParams {
        grace_period_seconds: Some(0),
        ..Default::default()
    };
    match api.delete(name, &params).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
impl ClusterEngine for KubeEngine {
    async fn pod_create(&self, request: &PodRequest) -> Result<()> {
        let env = request
            .environment
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect();
        let mut metadata = self.metadata(&request.name);
        metadata.labels = Some(request.labels.clone());
        let pod = Pod {
            metadata,
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: request.container.clone(),
                    image: Some(request.image.clone()),
                    command: (!request.command.is_empty()).then(|| request.command.clone()),
                    env: Some(env),
                    working_dir: request.working_dir.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let pods: Api<Pod> = self.api();
        pods.create(&PostParams::default(), &pod).await?;
        debug!(pod = %request.name, image = %request.image, "waiting for pod");

        let running = await_condition(pods, &request.name, conditions::is_pod_running());
        match tokio::time::timeout(self.ready_timeout, running).await {
            Ok(Ok(Some(_))) => Ok(()),
            Ok(Ok(None)) => Err(KubeError::Exec {
                pod: request.name.clone(),
                message: "pod was deleted before running".to_string(),
            }),
            Ok(Err(e)) => Err(KubeError::Exec {
                pod: request.name.clone(),
                message: format!("wait condition failed: {e}"),
            }),
            Err(_) => Err(KubeError::PodTimeout {
                pod: request.name.clone(),
                seconds: self.ready_timeout.as_secs(),
            }),
        }
    }

    async fn pod_exec(&self, pod: &str, container: &str, command: &[String]) -> Result<String> {
        let output = self.exec_raw(pod, container, command, None).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn pod_upload(&self, pod: &str, container: &str, source: &Path, destination: &str) -> Result<()> {
        let data = archive::pack_dir(source)?;
        let destination = shell_quote(destination);
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("mkdir -p {destination} && tar -xf - -C {destination}"),
        ];
        self.exec_raw(pod, container, &command, Some(data)).await?;
        Ok(())
    }

    async fn pod_download(&self, pod: &str, container: &str, source: &str, destination: &Path) -> Result<()> {
        let command = ["tar", "-cf", "-", "-C", source, "."].map(str::to_string);
        let data = self.exec_raw(pod, container, &command, None).await?;
        archive::unpack_replacing(&data, destination)?;
        Ok(())
    }

    async fn pod_delete(&self, pod: &str) -> Result<()> {
        debug!(pod, "deleting pod");
        delete_named(self.api::<Pod>(), pod).await
    }

    async fn service_account_create(&self, name: &str) -> Result<()> {
        let account = ServiceAccount {
            metadata: self.metadata(name),
            ..Default::default()
        };
        self.api::<ServiceAccount>()
            .create(&PostParams::default(), &account)
            .await?;
        Ok(())
    }

    async fn service_account_delete(&self, name: &str) -> Result<()> {
        delete_named(self.api::<ServiceAccount>(), name).await
    }

    async fn role_create(&self, name: &str, pods: &[String]) -> Result<()> {
        let role = Role {
            metadata: self.metadata(name),
            rules: Some(vec![
                PolicyRule {
                    api_groups: Some(vec![String::new()]),
                    resources: Some(vec!["pods".to_string()]),
                    resource_names: Some(pods.to_vec()),
                    verbs: vec!["get".to_string()],
                    ..Default::default()
                },
                PolicyRule {
                    api_groups: Some(vec![String::new()]),
                    resources: Some(vec!["pods/exec".to_string()]),
                    resource_names: Some(pods.to_vec()),
                    verbs: vec!["create".to_string(), "get".to_string()],
                    ..Default::default()
                },
            ]),
        };
        self.api::<Role>().create(&PostParams::default(), &role).await?;
        Ok(())
    }

    async fn role_delete(&self, name: &str) -> Result<()> {
        delete_named(self.api::<Role>(), name).await
    }

    async fn binding_create(&self, name: &str, role: &str, service_account: &str) -> Result<()> {
        let binding = RoleBinding {
            metadata: self.metadata(name),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: service_account.to_string(),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            }]),
        };
        self.api::<RoleBinding>()
            .create(&PostParams::default(), &binding)
            .await?;
        info!(binding = name, role, service_account, "granted pod access");
        Ok(())
    }

    async fn binding_delete(&self, name: &str) -> Result<()> {
        delete_named(self.api::<RoleBinding>(), name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/usr/local/working"), "'/usr/local/working'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
