//! Remote file management over a session link.
//!
//! Browsing, cached directory listings, extended file operations and
//! sequential upload batches against a remote agent reached through
//! [`link::RemoteLink`].

pub mod config;
pub mod files;
pub mod link;
pub mod session;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{ConfigStorage, FileManagerConfig};
pub use files::{
    BatchSummary, DirectoryListing, FileBrowser, FileEntry, FileOpError, OperationDispatcher,
    OperationOutcome, OperationRequest, RemoteDirectoryCache, UploadQueueManager,
};
pub use link::{LinkError, RemoteLink};
pub use session::{OsFamily, Session, SessionId, SessionRegistry};

/// Initialize logging
///
/// Honors `RUST_LOG`, falling back to `info`. Safe to call once per process.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
