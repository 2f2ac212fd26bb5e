//! StorageConfig and index path resolution.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the persistent tree index; `None` means the platform data dir
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the tree index directory.
    ///
    /// Default is `<data_dir>/evtree/tree-index` from `ProjectDirs`.
    pub fn resolve_index_path(&self) -> Result<PathBuf, ApiError> {
        if let Some(path) = &self.index_path {
            if !path.as_os_str().is_empty() {
                return Ok(path.clone());
            }
        }
        let project_dirs = directories::ProjectDirs::from("", "evtree", "evtree").ok_or_else(|| {
            ApiError::ConfigError(
                "Could not determine platform data directory for tree index".to_string(),
            )
        })?;
        Ok(project_dirs.data_dir().join("tree-index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let config = StorageConfig {
            index_path: Some(PathBuf::from("/tmp/evtree-index")),
        };
        assert_eq!(
            config.resolve_index_path().unwrap(),
            PathBuf::from("/tmp/evtree-index")
        );
    }

    #[test]
    fn test_default_path_under_data_dir() {
        let path = StorageConfig::default().resolve_index_path().unwrap();
        assert!(path.ends_with("tree-index"));
    }
}
