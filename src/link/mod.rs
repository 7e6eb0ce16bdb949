//! Remote link
//!
//! The session-scoped transport contract every file component talks through,
//! plus adapters:
//! - [`RpcLink`]: method/params envelopes over an abstract [`RpcTransport`]
//! - [`TimeoutLink`]: per-call deadlines around any link
//! - [`MemoryLink`]: an in-memory remote filesystem

pub mod error;
pub mod memory;
pub mod protocol;
pub mod rpc;
pub mod timeout;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::files::types::{FileEntry, GrepMatch};
use crate::session::SessionId;

pub use error::LinkError;
pub use memory::MemoryLink;
pub use protocol::{GrepParams, LinkMethod};
pub use rpc::{RpcLink, RpcTransport};
pub use timeout::TimeoutLink;

/// Session-scoped calls to a remote agent.
///
/// One method per remote call. Suspension happens at every call boundary;
/// implementations decide about deadlines and never retry on behalf of the caller.
#[async_trait]
pub trait RemoteLink: Send + Sync {
    /// List a directory (single level)
    async fn list(&self, session: &SessionId, path: &str) -> Result<Vec<FileEntry>, LinkError>;

    async fn mkdir(&self, session: &SessionId, path: &str) -> Result<(), LinkError>;

    /// Remove a file or directory
    async fn delete(&self, session: &SessionId, path: &str) -> Result<(), LinkError>;

    async fn move_entry(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError>;

    async fn copy(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError>;

    /// Search file contents; matches are ordered file-then-line
    async fn grep(
        &self,
        session: &SessionId,
        params: &GrepParams,
    ) -> Result<Vec<GrepMatch>, LinkError>;

    /// First `lines` lines of a regular file
    async fn head(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError>;

    /// Last `lines` lines of a regular file
    async fn tail(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError>;

    async fn chmod(
        &self,
        session: &SessionId,
        path: &str,
        mode: &str,
        recursive: bool,
    ) -> Result<(), LinkError>;

    async fn chown(
        &self,
        session: &SessionId,
        path: &str,
        uid: &str,
        gid: &str,
        recursive: bool,
    ) -> Result<(), LinkError>;

    /// Overwrite access and modification timestamps
    async fn chtimes(
        &self,
        session: &SessionId,
        path: &str,
        access_time: DateTime<Utc>,
        modify_time: DateTime<Utc>,
    ) -> Result<(), LinkError>;

    async fn upload(&self, session: &SessionId, dest_path: &str, data: Bytes)
        -> Result<(), LinkError>;

    async fn download(&self, session: &SessionId, path: &str) -> Result<Bytes, LinkError>;
}
