//! Toolkits published to a registry and unpacked into a local cache
//!
//! The cache directory of a repository holds the unpacked artifact of its
//! latest tag plus a `.tag` file naming that tag. A newer tag in the registry
//! replaces the whole directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use stool_core::Toolkit;
use tar::Archive;
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::registry::{Registry, latest_tag, split_image};

pub const TAG_FILE: &str = ".tag";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A toolkit repository and the directory it is cached in
#[derive(Debug, Clone)]
pub struct RegistryToolkit {
    repository: String,
    dir: PathBuf,
}

impl RegistryToolkit {
    /// The repository must not carry a tag; the latest one is always used
    pub fn new(repository: &str, cache_root: &Path) -> Result<Self> {
        let invalid = || RepoError::InvalidToolkitRepository {
            repository: repository.to_string(),
        };
        let (name, tag) = split_image(repository).map_err(|_| invalid())?;
        if tag.is_some() {
            return Err(invalid());
        }
        Ok(Self {
            repository: name.to_string(),
            dir: cache_root.join(name.replace(':', "_")),
        })
    }

    /// `~/.cache/stool/toolkits` on Linux
    pub fn default_cache_root() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("stool").join("toolkits"))
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tag currently unpacked in the cache
    pub fn cached_tag(&self) -> Option<String> {
        fs::read_to_string(self.dir.join(TAG_FILE))
            .ok()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
    }

    /// Bring the cache up to the latest tag and return that tag
    pub async fn update(&self, registry: &dyn Registry) -> Result<String> {
        let tag = latest_tag(&registry.tags(&self.repository).await?).ok_or_else(|| {
            RepoError::NoTags {
                repository: self.repository.clone(),
            }
        })?;
        match self.cached_tag() {
            Some(cached) if cached == tag => {
                debug!(repository = %self.repository, %tag, "toolkit is up to date");
                return Ok(tag);
            }
            Some(cached) => info!("updating toolkit {} {cached} -> {tag}", self.repository),
            None => info!("loading toolkit {} {tag}", self.repository),
        }

        let data = registry.pull_artifact(&self.repository, &tag).await?;
        self.replace(&data, &tag)?;
        Ok(tag)
    }

    /// Update the cache and load the toolkit from it
    pub async fn resolve(&self, registry: &dyn Registry) -> Result<Toolkit> {
        self.update(registry).await?;
        Ok(Toolkit::load(&self.dir)?)
    }

    /// Unpack next to the cache, then swap it in so a failed pull leaves the old toolkit intact
    fn replace(&self, data: &[u8], tag: &str) -> io::Result<()> {
        let name = self
            .dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = self.dir.with_file_name(format!(".{name}.partial"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        unpack(data, &staging)?;
        fs::write(staging.join(TAG_FILE), format!("{tag}\n"))?;
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::rename(&staging, &self.dir)
    }
}

/// Extract a tar archive, gzip compressed or not
fn unpack(data: &[u8], destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    if data.starts_with(&GZIP_MAGIC) {
        Archive::new(GzDecoder::new(data)).unpack(destination)
    } else {
        Archive::new(data).unpack(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRegistry;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    const REPOSITORY: &str = "registry.example.com/stool/toolkit";

    fn toolkit_artifact(version: &str, replicas: &str) -> Vec<u8> {
        let source = tempfile::tempdir().unwrap();
        fs::write(
            source.path().join("toolkit.yaml"),
            format!("version: \"{version}\"\nenvironment:\n  MODE: dev\n"),
        )
        .unwrap();
        fs::create_dir_all(source.path().join("directions")).unwrap();
        fs::write(
            source.path().join("directions/web.yaml"),
            format!("DIRECTIONS: web\nreplicas: \"{replicas}\"\n"),
        )
        .unwrap();

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder.append_dir_all(".", source.path()).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_rejects_tagged_repository() {
        let cache = tempfile::tempdir().unwrap();
        assert!(matches!(
            RegistryToolkit::new("registry.example.com/toolkit:1.0", cache.path()),
            Err(RepoError::InvalidToolkitRepository { .. })
        ));
        let toolkit = RegistryToolkit::new("localhost:5000/toolkit", cache.path()).unwrap();
        assert_eq!(toolkit.repository(), "localhost:5000/toolkit");
        assert_eq!(toolkit.dir(), cache.path().join("localhost_5000/toolkit"));
    }

    #[tokio::test]
    async fn test_first_resolve_pulls_latest() {
        let cache = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new();
        registry.add_artifact(REPOSITORY, "1.0.0", toolkit_artifact("1.0.0", "1"));
        registry.add_artifact(REPOSITORY, "1.2.0", toolkit_artifact("1.2.0", "2"));

        let source = RegistryToolkit::new(REPOSITORY, cache.path()).unwrap();
        let toolkit = source.resolve(&registry).await.unwrap();

        assert_eq!(toolkit.version(), "1.2.0");
        assert_eq!(toolkit.environment()["MODE"], "dev");
        assert!(toolkit.directions("web").is_ok());
        assert_eq!(source.cached_tag().as_deref(), Some("1.2.0"));
        assert_eq!(registry.operation_counts().pulls, 1);
    }

    #[tokio::test]
    async fn test_cached_tag_skips_pull() {
        let cache = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new();
        registry.add_artifact(REPOSITORY, "1.0.0", toolkit_artifact("1.0.0", "1"));

        let source = RegistryToolkit::new(REPOSITORY, cache.path()).unwrap();
        source.resolve(&registry).await.unwrap();
        let toolkit = source.resolve(&registry).await.unwrap();

        assert_eq!(toolkit.version(), "1.0.0");
        let counts = registry.operation_counts();
        assert_eq!(counts.tags, 2);
        assert_eq!(counts.pulls, 1);
    }

    #[tokio::test]
    async fn test_newer_tag_replaces_cache() {
        let cache = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new();
        registry.add_artifact(REPOSITORY, "1.0.0", toolkit_artifact("1.0.0", "1"));

        let source = RegistryToolkit::new(REPOSITORY, cache.path()).unwrap();
        source.resolve(&registry).await.unwrap();
        fs::write(source.dir().join("stale.txt"), "x").unwrap();

        registry.add_artifact(REPOSITORY, "1.1.0", toolkit_artifact("1.1.0", "5"));
        let toolkit = source.resolve(&registry).await.unwrap();

        assert_eq!(toolkit.version(), "1.1.0");
        assert_eq!(source.cached_tag().as_deref(), Some("1.1.0"));
        assert!(!source.dir().join("stale.txt").exists());
        assert_eq!(registry.operation_counts().pulls, 2);
    }

    #[tokio::test]
    async fn test_failed_pull_keeps_cache() {
        let cache = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new();
        registry.add_artifact(REPOSITORY, "1.0.0", toolkit_artifact("1.0.0", "1"));

        let source = RegistryToolkit::new(REPOSITORY, cache.path()).unwrap();
        source.resolve(&registry).await.unwrap();

        // a tag without artifact content fails to pull
        registry.add_labeled(REPOSITORY, "2.0.0", None, "l", "v");
        assert!(source.resolve(&registry).await.is_err());
        assert_eq!(source.cached_tag().as_deref(), Some("1.0.0"));
        assert_eq!(Toolkit::load(source.dir()).unwrap().version(), "1.0.0");
    }

    #[tokio::test]
    async fn test_repository_without_tags() {
        let cache = tempfile::tempdir().unwrap();
        let source = RegistryToolkit::new(REPOSITORY, cache.path()).unwrap();
        assert!(matches!(
            source.resolve(&MockRegistry::new()).await.unwrap_err(),
            RepoError::NoTags { .. }
        ));
    }

    #[test]
    fn test_unpack_plain_tar() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("toolkit.yaml"), "version: \"3\"\n").unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_dir_all(".", source.path()).unwrap();
        let data = builder.into_inner().unwrap();

        let destination = tempfile::tempdir().unwrap();
        unpack(&data, &destination.path().join("out")).unwrap();
        assert!(destination.path().join("out/toolkit.yaml").exists());
    }
}
