//! Remote file management
//!
//! Provides:
//! - Path navigation over slash-separated remote paths
//! - A per-session directory listing cache with explicit invalidation
//! - Extended operations (move, copy, grep, head/tail, chmod, chown, chtimes, ...)
//! - Sequential upload batches with per-item state
//! - [`FileBrowser`], which ties the above together for one session

pub mod browser;
pub mod cache;
pub mod error;
pub mod operations;
pub mod path;
pub mod types;
pub mod upload;

pub use browser::FileBrowser;
pub use cache::{CacheStats, InvalidationSet, RemoteDirectoryCache};
pub use error::FileOpError;
pub use operations::{
    OperationDispatcher, OperationKind, OperationOutcome, OperationOutput, OperationRequest,
};
pub use path::{Breadcrumb, PathNavigator};
pub use types::{DirectoryListing, FileEntry, GrepMatch};
pub use upload::{
    BatchOutcome, BatchSummary, LocalFile, UploadEvent, UploadItem, UploadQueueManager,
    UploadState,
};
