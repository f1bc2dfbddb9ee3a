//! OCI registry access
//!
//! Image metadata is read from tags and the image config (author, creation
//! time and labels). Artifacts pushed with `oras` are pulled as raw layer content.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::manifest::{
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE,
};
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RepoError, Result};
use crate::registry::{Registry, TagInfo};

/// Layer types accepted for artifacts; `oras push` labels files as plain tar layers
const ARTIFACT_MEDIA_TYPES: [&str; 3] = [
    IMAGE_LAYER_MEDIA_TYPE,
    IMAGE_LAYER_GZIP_MEDIA_TYPE,
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
];

/// Registry client over the OCI distribution API
pub struct OciRegistry {
    client: Client,
    auth: RegistryAuth,
}

impl OciRegistry {
    pub fn new(auth: RegistryAuth, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(RegistryAuth::Anonymous, ClientProtocol::Https)
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(
            RegistryAuth::Basic(username.into(), password.into()),
            ClientProtocol::Https,
        )
    }

    /// Basic auth when credentials are given, plain http when `insecure`
    pub fn configured(credentials: Option<(String, String)>, insecure: bool) -> Self {
        let auth = match credentials {
            Some((username, password)) => RegistryAuth::Basic(username, password),
            None => RegistryAuth::Anonymous,
        };
        let protocol = if insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        Self::new(auth, protocol)
    }

    fn reference(repository: &str, tag: &str) -> Result<Reference> {
        let image = format!("{repository}:{tag}");
        Reference::try_from(image.as_str()).map_err(|e| RepoError::InvalidReference {
            reference: image.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Registry for OciRegistry {
    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let reference = Self::reference(repository, "latest")?;
        let response = self
            .client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(|e| RepoError::Registry {
                message: format!("Failed to list tags of {repository}: {e}"),
            })?;
        Ok(response.tags)
    }

    async fn info(&self, repository: &str, tag: &str) -> Result<TagInfo> {
        let reference = Self::reference(repository, tag)?;
        debug!(image = %reference, "reading image config");
        let (_manifest, _digest, config) = self
            .client
            .pull_manifest_and_config(&reference, &self.auth)
            .await
            .map_err(|e| RepoError::Registry {
                message: format!("Failed to read {repository}:{tag}: {e}"),
            })?;
        parse_image_config(repository, tag, &config)
    }

    async fn pull_artifact(&self, repository: &str, tag: &str) -> Result<Vec<u8>> {
        let reference = Self::reference(repository, tag)?;
        debug!(image = %reference, "pulling artifact");
        let image = self
            .client
            .pull(&reference, &self.auth, ARTIFACT_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| RepoError::Registry {
                message: format!("Failed to pull {repository}:{tag}: {e}"),
            })?;
        image
            .layers
            .into_iter()
            .next()
            .map(|layer| layer.data)
            .ok_or_else(|| RepoError::Registry {
                message: format!("{repository}:{tag} has no layers"),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    config: Option<ContainerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

/// Extract tag metadata from an image config blob
pub fn parse_image_config(repository: &str, tag: &str, json: &str) -> Result<TagInfo> {
    let config: ImageConfig = serde_json::from_str(json)?;
    Ok(TagInfo {
        repository: repository.to_string(),
        tag: tag.to_string(),
        author: config.author.filter(|a| !a.is_empty()),
        labels: config
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default(),
        created: config.created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_config() {
        let json = r#"{
            "author": "jane",
            "created": "2024-03-01T10:00:00Z",
            "architecture": "amd64",
            "config": {"Labels": {"stool-directions": "abc", "other": "x"}, "Env": ["PATH=/bin"]}
        }"#;
        let info = parse_image_config("registry/app", "1.0", json).unwrap();
        assert_eq!(info.author.as_deref(), Some("jane"));
        assert_eq!(info.labels.get("stool-directions").map(String::as_str), Some("abc"));
        assert_eq!(info.image(), "registry/app:1.0");
        assert!(info.created.is_some());
    }

    #[test]
    fn test_parse_image_config_without_labels() {
        let info = parse_image_config("r", "t", r#"{"config": {"Labels": null}}"#).unwrap();
        assert!(info.labels.is_empty());
        assert!(info.author.is_none());
    }

    #[test]
    fn test_reference() {
        assert!(OciRegistry::reference("registry.example.com/stool/app", "1.0").is_ok());
    }
}
