// Configuration loaded from YAML

use crate::storage::{FileStorage, MemoryStorage, SqliteStorage, Storage, validate_key};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which storage backend holds the blobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Data directory; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
    pub tasks_key: String,
    pub dark_mode_key: String,
    /// Filter directive used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            data_dir: None,
            tasks_key: "todo-tasks".to_string(),
            dark_mode_key: "todo-dark-mode".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                return Err(eyre::eyre!("Config file not found: {}", path.display()));
            }
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key(&self.tasks_key)?;
        validate_key(&self.dark_mode_key)?;
        Ok(())
    }

    /// Configured data directory, falling back to `<data_dir>/todostore`
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("todostore")))
            .unwrap_or_else(|| PathBuf::from(".todostore"))
    }

    /// Open the configured backend
    pub fn open_storage(&self) -> Result<Box<dyn Storage>> {
        let storage: Box<dyn Storage> = match self.backend {
            Backend::File => Box::new(FileStorage::open(self.resolved_data_dir())?),
            Backend::Sqlite => Box::new(SqliteStorage::open(self.resolved_data_dir())?),
            Backend::Memory => Box::new(MemoryStorage::new()),
        };
        Ok(storage)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("todostore").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.tasks_key, "todo-tasks");
        assert_eq!(config.dark_mode_key, "todo-dark-mode");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("backend: sqlite\ndata_dir: /tmp/tasks\n").unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/tasks")));
        assert_eq!(config.tasks_key, "todo-tasks");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("backend: floppy\n").is_err());
        assert!(Config::from_yaml("tasks_key: \"has space\"\n").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "backend: memory\ntasks_key: my-tasks\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.tasks_key, "my-tasks");

        assert!(Config::load(Some(&temp.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_open_storage_uses_data_dir() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            backend: Backend::Sqlite,
            data_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };

        let mut storage = config.open_storage().unwrap();
        storage.set("todo-tasks", "[]").unwrap();
        assert!(temp.path().join("todostore.db").exists());
        assert_eq!(config.resolved_data_dir(), temp.path());
    }
}
