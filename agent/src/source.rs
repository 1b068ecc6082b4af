use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::{state::ClusterState, Error, Result};

/// Supplies the cluster's desired state for this node.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn load(&self) -> Result<ClusterState>;
}

/// Re-reads a YAML (or `.json`) document on every call.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StateSource for FileSource {
    async fn load(&self) -> Result<ClusterState> {
        debug!("loading desired state from {}", self.path.display());

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Source(format!("{}: {}", self.path.display(), e)))?;

        let state = if self.path.extension().map_or(false, |ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(state)
    }
}

pub struct StaticSource {
    state: ClusterState,
}

impl StaticSource {
    pub fn new(state: ClusterState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl StateSource for StaticSource {
    async fn load(&self) -> Result<ClusterState> {
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        let source = FileSource::new(&path);

        assert!(matches!(source.load().await, Err(Error::Source(_))));

        std::fs::write(&path, "node:\n  name: hv-1\n  hypervisor: true\n").unwrap();
        let state = source.load().await.unwrap();
        assert_eq!(state.node.name, "hv-1");

        std::fs::write(&path, "node:\n  name: hv-2\n").unwrap();
        let state = source.load().await.unwrap();
        assert_eq!(state.node.name, "hv-2");
        assert!(!state.node.hypervisor);
    }

    #[tokio::test]
    async fn test_file_source_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"node":{"name":"hv-1"},"instances":[]}"#).unwrap();

        let state = FileSource::new(&path).load().await.unwrap();
        assert_eq!(state.node.name, "hv-1");

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileSource::new(&path).load().await,
            Err(Error::Json(_))
        ));
    }
}
