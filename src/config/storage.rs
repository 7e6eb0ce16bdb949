//! Configuration Storage
//!
//! Reads and writes the config file.
//! Config location: ~/.remote-files/config.json

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::{FileManagerConfig, CONFIG_VERSION};

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

impl serde::Serialize for StorageError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Configuration directory (`~/.remote-files`)
pub fn config_dir() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| home.join(".remote-files"))
        .ok_or(StorageError::NoConfigDir)
}

/// Default config file path
pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Configuration storage manager
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: config_file()?,
        })
    }

    /// Storage at a custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load configuration from disk
    ///
    /// Missing file yields defaults. A corrupted file is backed up and
    /// replaced by defaults in memory.
    pub async fn load(&self) -> Result<FileManagerConfig, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileManagerConfig::default())
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        match serde_json::from_str::<FileManagerConfig>(&contents) {
            Ok(config) if config.version > CONFIG_VERSION => Err(StorageError::VersionTooNew {
                found: config.version,
                supported: CONFIG_VERSION,
            }),
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("Config file corrupted: {}", e);
                match self.backup().await {
                    Ok(backup_path) => tracing::warn!(
                        "Corrupted config backed up to {:?}, using defaults",
                        backup_path
                    ),
                    Err(backup_err) => {
                        tracing::error!("Failed to backup corrupted config: {}", backup_err)
                    }
                }
                Ok(FileManagerConfig::default())
            }
        }
    }

    /// Save configuration to disk
    pub async fn save(&self, config: &FileManagerConfig) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        // Write to temp file first, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the current file next to itself with a timestamp suffix
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}
