//! In-memory registry for testing

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{RepoError, Result};
use crate::registry::{Registry, TagInfo};

/// Registry holding tag metadata in memory
#[derive(Clone, Default)]
pub struct MockRegistry {
    /// repository -> tag -> info
    images: Arc<RwLock<HashMap<String, HashMap<String, TagInfo>>>>,
    /// (repository, tag) -> layer content
    artifacts: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub tags: usize,
    pub infos: usize,
    pub pulls: usize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, info: TagInfo) {
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(info.repository.clone())
            .or_default()
            .insert(info.tag.clone(), info);
    }

    /// Add an image carrying a label
    pub fn add_labeled(&self, repository: &str, tag: &str, author: Option<&str>, label: &str, value: &str) {
        let mut info = TagInfo {
            repository: repository.to_string(),
            tag: tag.to_string(),
            author: author.map(str::to_string),
            ..Default::default()
        };
        info.labels.insert(label.to_string(), value.to_string());
        self.add(info);
    }

    /// Add a tag whose artifact layer is `data`
    pub fn add_artifact(&self, repository: &str, tag: &str, data: Vec<u8>) {
        self.add(TagInfo {
            repository: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        });
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((repository.to_string(), tag.to_string()), data);
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        self.count(|c| c.tags += 1);
        let images = self.images.read().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<String> = images
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        Ok(tags)
    }

    async fn info(&self, repository: &str, tag: &str) -> Result<TagInfo> {
        self.count(|c| c.infos += 1);
        let images = self.images.read().unwrap_or_else(PoisonError::into_inner);
        images
            .get(repository)
            .and_then(|tags| tags.get(tag))
            .cloned()
            .ok_or_else(|| RepoError::TagNotFound {
                repository: repository.to_string(),
                tag: tag.to_string(),
            })
    }

    async fn pull_artifact(&self, repository: &str, tag: &str) -> Result<Vec<u8>> {
        self.count(|c| c.pulls += 1);
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        artifacts
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
            .ok_or_else(|| RepoError::TagNotFound {
                repository: repository.to_string(),
                tag: tag.to_string(),
            })
    }
}
