//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileManagerConfig {
    pub version: u32,
    pub upload: UploadConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub operations: OperationDefaults,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            upload: UploadConfig::default(),
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            operations: OperationDefaults::default(),
        }
    }
}

/// Synthetic upload progress
///
/// The remote call gives no byte-level feedback, so progress is approximated:
/// it starts at `initial_progress` and grows by `tick_increment` every
/// `tick_interval_ms` until `progress_cap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub tick_interval_ms: u64,
    pub initial_progress: u8,
    pub tick_increment: u8,
    /// Must stay below 100; 100 is reserved for a completed transfer
    pub progress_cap: u8,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            initial_progress: 10,
            tick_increment: 10,
            progress_cap: 90,
        }
    }
}

impl UploadConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// `progress_cap` clamped into `initial_progress..=99`
    pub fn effective_cap(&self) -> u8 {
        self.progress_cap.min(99).max(self.initial_progress.min(99))
    }
}

/// Per-call deadlines in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// ls
    pub list_secs: u64,
    /// mkdir, rm, mv, cp, chmod, chown, chtimes
    pub mutation_secs: u64,
    /// grep, head, tail
    pub read_secs: u64,
    /// upload, download
    pub transfer_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            list_secs: 60,
            mutation_secs: 30,
            read_secs: 60,
            transfer_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Listings older than this are treated as missing. `None` keeps them until invalidated.
    pub max_age_secs: Option<u64>,
}

impl CacheConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationDefaults {
    /// Line count used by head/tail when none is given
    pub head_tail_lines: u32,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        Self { head_tail_lines: 10 }
    }
}
