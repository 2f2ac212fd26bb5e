//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::EngineConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an optional file plus environment.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, ApiError> {
        let config = MergeService::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file (must exist).
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load(Some(path))
    }

    /// Write configuration as TOML.
    pub fn save(config: &EngineConfig, path: &Path) -> Result<(), ApiError> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        std::fs::write(path, content).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Create default configuration.
    pub fn default() -> EngineConfig {
        EngineConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evtree.toml");

        let mut config = ConfigLoader::default();
        config.cache.capacity = 4;
        config.perf.thresholds.build_tree_ms = 75.0;
        ConfigLoader::save(&config, &path).unwrap();

        let loaded = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(loaded.cache.capacity, 4);
        assert_eq!(loaded.perf.thresholds.build_tree_ms, 75.0);
        assert_eq!(loaded.resolver, config.resolver);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ApiError::ConfigError(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config.cache.capacity, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[cache]\ncapacity = 0\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }
}
