//! Application configuration
//!
//! Loaded from `$CUECANNON_CONFIG` or `<config dir>/cuecannon.toml`. Every
//! field has a default, so a missing file is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cuecannon_net::{MeshConfig, DEFAULT_PORT};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "CUECANNON_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub show: ShowConfig,
    pub canon: CanonConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen: SocketAddr,
    pub bootstrap: Vec<SocketAddr>,
    /// Run against an in-process hub instead of TCP
    pub memory: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            bootstrap: Vec::new(),
            memory: false,
        }
    }
}

impl NetworkConfig {
    pub fn mesh(&self) -> MeshConfig {
        MeshConfig {
            listen_addr: self.listen,
            bootstrap: self.bootstrap.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Delay before re-announcing the production to a newly connected peer
    pub reannounce_delay_secs: u64,
    pub display_name: String,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            reannounce_delay_secs: 5,
            display_name: "Player".to_string(),
        }
    }
}

impl ShowConfig {
    pub fn reannounce_delay(&self) -> Duration {
        Duration::from_secs(self.reannounce_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonConfig {
    pub bucket_url: String,
    pub index: String,
    /// Consult the remote bucket at all
    pub remote: bool,
}

impl Default for CanonConfig {
    fn default() -> Self {
        Self {
            bucket_url: "https://macbeezy.s3.us-east-2.amazonaws.com/".to_string(),
            index: "play_list.json".to_string(),
            remote: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the environment-selected or default location
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => match project_dirs() {
                Some(dirs) => Self::load_from(&dirs.config_dir().join("cuecannon.toml")),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Directory holding the local script database
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }

        let dirs = project_dirs().ok_or_else(|| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "cuecannon", "cuecannon")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.listen.port(), DEFAULT_PORT);
        assert_eq!(config.show.reannounce_delay(), Duration::from_secs(5));
        assert!(config.canon.remote);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.network.bootstrap.is_empty());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuecannon.toml");
        std::fs::write(
            &path,
            r#"
[network]
bootstrap = ["192.168.1.20:7440"]

[show]
display_name = "Tessa"
reannounce_delay_secs = 2

[storage]
data_dir = "/tmp/cuecannon"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.network.bootstrap.len(), 1);
        assert_eq!(config.network.listen.port(), DEFAULT_PORT);
        assert_eq!(config.show.display_name, "Tessa");
        assert_eq!(config.show.reannounce_delay(), Duration::from_secs(2));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/cuecannon"));
        assert_eq!(config.canon.index, "play_list.json");
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuecannon.toml");
        std::fs::write(&path, "[network\nlisten = 4").unwrap();
        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }
}
