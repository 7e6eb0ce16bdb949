//! Per-call deadlines
//!
//! Wraps any [`RemoteLink`] and bounds each call by its [`CallClass`] deadline.
//! An expired deadline is reported as [`LinkError::Timeout`] and is never retried.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::error::LinkError;
use super::protocol::{CallClass, GrepParams, LinkMethod};
use super::RemoteLink;
use crate::config::TimeoutConfig;
use crate::files::types::{FileEntry, GrepMatch};
use crate::session::SessionId;

pub struct TimeoutLink<L> {
    inner: L,
    timeouts: TimeoutConfig,
}

impl<L: RemoteLink> TimeoutLink<L> {
    pub fn new(inner: L, timeouts: TimeoutConfig) -> Self {
        Self { inner, timeouts }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn limit(&self, class: CallClass) -> Duration {
        let secs = match class {
            CallClass::Listing => self.timeouts.list_secs,
            CallClass::Mutation => self.timeouts.mutation_secs,
            CallClass::Read => self.timeouts.read_secs,
            CallClass::Transfer => self.timeouts.transfer_secs,
        };
        Duration::from_secs(secs)
    }

    async fn guard<T, F>(
        &self,
        session: &SessionId,
        method: LinkMethod,
        fut: F,
    ) -> Result<T, LinkError>
    where
        F: Future<Output = Result<T, LinkError>> + Send,
    {
        let limit = self.limit(method.class());
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[timeout-link] {} on session {} exceeded {:?}",
                    method, session, limit
                );
                Err(LinkError::Timeout(format!(
                    "{} did not complete within {}s",
                    method,
                    limit.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl<L: RemoteLink> RemoteLink for TimeoutLink<L> {
    async fn list(&self, session: &SessionId, path: &str) -> Result<Vec<FileEntry>, LinkError> {
        self.guard(session, LinkMethod::List, self.inner.list(session, path))
            .await
    }

    async fn mkdir(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.guard(session, LinkMethod::Mkdir, self.inner.mkdir(session, path))
            .await
    }

    async fn delete(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.guard(session, LinkMethod::Delete, self.inner.delete(session, path))
            .await
    }

    async fn move_entry(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        self.guard(session, LinkMethod::Move, self.inner.move_entry(session, src, dst))
            .await
    }

    async fn copy(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        self.guard(session, LinkMethod::Copy, self.inner.copy(session, src, dst))
            .await
    }

    async fn grep(
        &self,
        session: &SessionId,
        params: &GrepParams,
    ) -> Result<Vec<GrepMatch>, LinkError> {
        self.guard(session, LinkMethod::Grep, self.inner.grep(session, params))
            .await
    }

    async fn head(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        self.guard(session, LinkMethod::Head, self.inner.head(session, path, lines))
            .await
    }

    async fn tail(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        self.guard(session, LinkMethod::Tail, self.inner.tail(session, path, lines))
            .await
    }

    async fn chmod(
        &self,
        session: &SessionId,
        path: &str,
        mode: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        self.guard(
            session,
            LinkMethod::Chmod,
            self.inner.chmod(session, path, mode, recursive),
        )
        .await
    }

    async fn chown(
        &self,
        session: &SessionId,
        path: &str,
        uid: &str,
        gid: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        self.guard(
            session,
            LinkMethod::Chown,
            self.inner.chown(session, path, uid, gid, recursive),
        )
        .await
    }

    async fn chtimes(
        &self,
        session: &SessionId,
        path: &str,
        access_time: DateTime<Utc>,
        modify_time: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        self.guard(
            session,
            LinkMethod::Chtimes,
            self.inner.chtimes(session, path, access_time, modify_time),
        )
        .await
    }

    async fn upload(
        &self,
        session: &SessionId,
        dest_path: &str,
        data: Bytes,
    ) -> Result<(), LinkError> {
        self.guard(
            session,
            LinkMethod::Upload,
            self.inner.upload(session, dest_path, data),
        )
        .await
    }

    async fn download(&self, session: &SessionId, path: &str) -> Result<Bytes, LinkError> {
        self.guard(session, LinkMethod::Download, self.inner.download(session, path))
            .await
    }
}
