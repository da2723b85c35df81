//! Store configuration loading
//!
//! Resolution priority: explicit path argument, then the
//! `CIRRUS_FLAVORS_CONFIG` environment variable, then the per-user
//! config directory, then compiled defaults.

use crate::db::extra_specs::DEFAULT_EXTRA_SPEC_RETRIES;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "CIRRUS_FLAVORS_CONFIG";

/// Flavor store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the API (shared) flavor database
    pub api_database: PathBuf,
    /// Path of the legacy per-cell flavor database
    pub cell_database: PathBuf,
    /// Whole-transaction attempts for the extra-spec upsert
    pub extra_spec_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("./cirrus_data"))
            .join("cirrus");
        Self {
            api_database: data_dir.join("flavors-api.db"),
            cell_database: data_dir.join("flavors-cell.db"),
            extra_spec_retries: DEFAULT_EXTRA_SPEC_RETRIES,
        }
    }
}

impl StoreConfig {
    /// Load configuration, falling back to defaults when no file is found
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match resolve_config_file(config_path) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a specific TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("Cannot read {}: {}", path.display(), err)))?;
        toml::from_str(&content)
            .map_err(|err| Error::Config(format!("Cannot parse {}: {}", path.display(), err)))
    }
}

fn resolve_config_file(config_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: explicit argument
    if let Some(path) = config_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: per-user config directory
    let user_config = dirs::config_dir().map(|d| d.join("cirrus").join("flavors.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: StoreConfig =
            toml::from_str("api_database = \"/var/lib/cirrus/api.db\"").unwrap();
        assert_eq!(config.api_database, PathBuf::from("/var/lib/cirrus/api.db"));
        assert_eq!(config.extra_spec_retries, DEFAULT_EXTRA_SPEC_RETRIES);
    }

    #[test]
    fn test_load_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flavors.toml");
        std::fs::write(&path, "cell_database = \"/tmp/cell-override.db\"").unwrap();

        let config = StoreConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.cell_database,
            PathBuf::from("/tmp/cell-override.db")
        );

        let err = StoreConfig::load(Some(Path::new("/nonexistent/flavors.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_full_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            api_database = "/tmp/api.db"
            cell_database = "/tmp/cell.db"
            extra_spec_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.cell_database, PathBuf::from("/tmp/cell.db"));
        assert_eq!(config.extra_spec_retries, 3);
    }
}
