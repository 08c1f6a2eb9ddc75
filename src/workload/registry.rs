use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::fsutil;

use super::{Error, Result, WorkloadSpec};

/// Source of the specs of the workloads installed on this node.
#[async_trait]
pub trait WorkloadSpecRegistry: Send + Sync {
    /// Returns the spec of `name`, or `None` if no such workload is installed.
    async fn get_spec(&self, name: &str) -> Result<Option<WorkloadSpec>>;

    /// Returns the specs of every installed workload.
    async fn installed(&self) -> Result<Vec<WorkloadSpec>>;
}

/// Reads installed workload specs from a JSON array on disk.
///
/// The file is re-read on every call so installs and removals performed by
/// the node become visible without a restart.
#[derive(Debug, Clone)]
pub struct FileSpecRegistry {
    path: PathBuf,
}

impl FileSpecRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<WorkloadSpec>> {
        let reader = fsutil::open_file_reader(&self.path)?;
        serde_json::from_reader(reader).map_err(|source| Error::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl WorkloadSpecRegistry for FileSpecRegistry {
    async fn get_spec(&self, name: &str) -> Result<Option<WorkloadSpec>> {
        Ok(self.load()?.into_iter().find(|spec| spec.name == name))
    }

    async fn installed(&self) -> Result<Vec<WorkloadSpec>> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry_with(contents: &str) -> (tempfile::NamedTempFile, FileSpecRegistry) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{contents}").unwrap();
        let registry = FileSpecRegistry::new(tmp.path());
        (tmp, registry)
    }

    #[tokio::test]
    async fn test_get_spec_by_name() {
        let (_tmp, registry) = registry_with(
            r#"[
                {"name": "polkadot", "version": 2},
                {"name": "app1", "version": 4, "components": [{"name": "web"}, {"name": "db"}]}
            ]"#,
        );

        let spec = registry.get_spec("app1").await.unwrap().unwrap();
        assert_eq!(spec.components.len(), 2);
        assert!(registry.get_spec("missing").await.unwrap().is_none());
        assert_eq!(registry.installed().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let registry = FileSpecRegistry::new("/definitely/does/not/exist.json");
        let err = registry.installed().await.unwrap_err();
        assert!(matches!(err, Error::FileOpen(_)));
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let (_tmp, registry) = registry_with("{not json");
        let err = registry.get_spec("polkadot").await.unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
