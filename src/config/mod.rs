//! Configuration Management Module
//!
//! Tunables for uploads, call deadlines, listing cache and operation defaults,
//! persisted as a single JSON file.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{
    CacheConfig, FileManagerConfig, OperationDefaults, TimeoutConfig, UploadConfig,
    CONFIG_VERSION,
};
