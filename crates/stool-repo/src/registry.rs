//! Container registry abstraction

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use semver::Version;

use crate::error::{RepoError, Result};

/// Metadata of one tagged image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagInfo {
    pub repository: String,
    pub tag: String,
    pub author: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub created: Option<DateTime<Utc>>,
}

impl TagInfo {
    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Read access to a container registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// All tags of a repository
    async fn tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Metadata of one tag
    async fn info(&self, repository: &str, tag: &str) -> Result<TagInfo>;

    /// Content of the first layer of an artifact, as pushed by `oras push`
    async fn pull_artifact(&self, repository: &str, tag: &str) -> Result<Vec<u8>>;

    /// Metadata of an image reference; without a tag the latest tag is used
    async fn resolve(&self, image: &str) -> Result<TagInfo> {
        let (repository, tag) = split_image(image)?;
        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => latest_tag(&self.tags(repository).await?).ok_or_else(|| {
                RepoError::NoTags {
                    repository: repository.to_string(),
                }
            })?,
        };
        self.info(repository, &tag).await
    }
}

/// Split `registry/repo:tag` into repository and optional tag
pub fn split_image(image: &str) -> Result<(&str, Option<&str>)> {
    let image = image.trim();
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (repository, tag) = match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&image[..split], Some(&image[split + 1..]))
        }
        None => (image, None),
    };
    if repository.is_empty() || tag.is_some_and(str::is_empty) {
        return Err(RepoError::InvalidImage {
            reference: image.to_string(),
        });
    }
    Ok((repository, tag))
}

/// The highest tag: semantic versions (an optional `v` prefix is ignored) win over
/// other tags, which are compared as text
pub fn latest_tag(tags: &[String]) -> Option<String> {
    tags.iter()
        .max_by(|a, b| match (parse_version(a), parse_version(b)) {
            (Some(va), Some(vb)) => va.cmp(&vb),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => a.cmp(b),
        })
        .cloned()
}

fn parse_version(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image() {
        assert_eq!(
            split_image("registry.example.com/stool/app:1.0").unwrap(),
            ("registry.example.com/stool/app", Some("1.0"))
        );
        assert_eq!(
            split_image("localhost:5000/app").unwrap(),
            ("localhost:5000/app", None)
        );
        assert_eq!(
            split_image("localhost:5000/app:2").unwrap(),
            ("localhost:5000/app", Some("2"))
        );
        assert!(split_image("app:").is_err());
    }

    #[test]
    fn test_latest_tag() {
        let tags = ["1.2.0", "v1.10.0", "1.9.3", "latest"].map(String::from);
        assert_eq!(latest_tag(&tags).as_deref(), Some("v1.10.0"));

        let plain = ["a", "c", "b"].map(String::from);
        assert_eq!(latest_tag(&plain).as_deref(), Some("c"));

        assert_eq!(latest_tag(&[]), None);
    }
}
