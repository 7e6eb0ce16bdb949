//! RPC-backed link
//!
//! Maps every [`RemoteLink`] call onto a single `method` + JSON `params`
//! round-trip through an [`RpcTransport`]. The transport (HTTP API, websocket,
//! stream channel) lives outside this crate.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::LinkError;
use super::protocol::{
    ChmodParams, ChownParams, ChtimesParams, DataResult, GrepParams, GrepResult, HeadTailParams,
    LinkMethod, ListResult, PathParams, SrcDstParams, UploadParams,
};
use super::RemoteLink;
use crate::files::types::{FileEntry, GrepMatch};
use crate::session::SessionId;

/// One request/response exchange with the console backend.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        session: &SessionId,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LinkError>;
}

/// [`RemoteLink`] over an [`RpcTransport`]
pub struct RpcLink<T> {
    transport: T,
}

impl<T: RpcTransport> RpcLink<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<P: Serialize + Sync>(
        &self,
        session: &SessionId,
        method: LinkMethod,
        params: &P,
    ) -> Result<serde_json::Value, LinkError> {
        let params = serde_json::to_value(params)?;
        debug!("[rpc-link] {} -> {}", session, method);
        self.transport
            .call(session, method.wire_name(), params)
            .await
    }

    async fn call_typed<P: Serialize + Sync, R: DeserializeOwned>(
        &self,
        session: &SessionId,
        method: LinkMethod,
        params: &P,
    ) -> Result<R, LinkError> {
        let value = self.call(session, method, params).await?;
        serde_json::from_value(value).map_err(|e| LinkError::Protocol(e.to_string()))
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl<T: RpcTransport> RemoteLink for RpcLink<T> {
    async fn list(&self, session: &SessionId, path: &str) -> Result<Vec<FileEntry>, LinkError> {
        let result: ListResult = self
            .call_typed(session, LinkMethod::List, &PathParams { path: path.into() })
            .await?;
        Ok(result.files)
    }

    async fn mkdir(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.call(session, LinkMethod::Mkdir, &PathParams { path: path.into() })
            .await?;
        Ok(())
    }

    async fn delete(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.call(session, LinkMethod::Delete, &PathParams { path: path.into() })
            .await?;
        Ok(())
    }

    async fn move_entry(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        let params = SrcDstParams {
            src: src.into(),
            dst: dst.into(),
        };
        self.call(session, LinkMethod::Move, &params).await?;
        Ok(())
    }

    async fn copy(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        let params = SrcDstParams {
            src: src.into(),
            dst: dst.into(),
        };
        self.call(session, LinkMethod::Copy, &params).await?;
        Ok(())
    }

    async fn grep(
        &self,
        session: &SessionId,
        params: &GrepParams,
    ) -> Result<Vec<GrepMatch>, LinkError> {
        let result: GrepResult = self.call_typed(session, LinkMethod::Grep, params).await?;
        Ok(result.matches)
    }

    async fn head(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        let params = HeadTailParams {
            path: path.into(),
            lines,
        };
        let result: DataResult = self.call_typed(session, LinkMethod::Head, &params).await?;
        Ok(result.data)
    }

    async fn tail(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        let params = HeadTailParams {
            path: path.into(),
            lines,
        };
        let result: DataResult = self.call_typed(session, LinkMethod::Tail, &params).await?;
        Ok(result.data)
    }

    async fn chmod(
        &self,
        session: &SessionId,
        path: &str,
        mode: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        let params = ChmodParams {
            path: path.into(),
            mode: mode.into(),
            recursive,
        };
        self.call(session, LinkMethod::Chmod, &params).await?;
        Ok(())
    }

    async fn chown(
        &self,
        session: &SessionId,
        path: &str,
        uid: &str,
        gid: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        let params = ChownParams {
            path: path.into(),
            uid: uid.into(),
            gid: gid.into(),
            recursive,
        };
        self.call(session, LinkMethod::Chown, &params).await?;
        Ok(())
    }

    async fn chtimes(
        &self,
        session: &SessionId,
        path: &str,
        access_time: DateTime<Utc>,
        modify_time: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        let params = ChtimesParams {
            path: path.into(),
            atime: iso(access_time),
            mtime: iso(modify_time),
        };
        self.call(session, LinkMethod::Chtimes, &params).await?;
        Ok(())
    }

    async fn upload(
        &self,
        session: &SessionId,
        dest_path: &str,
        data: Bytes,
    ) -> Result<(), LinkError> {
        let params = UploadParams {
            path: dest_path.into(),
            data: base64::engine::general_purpose::STANDARD.encode(&data),
        };
        self.call(session, LinkMethod::Upload, &params).await?;
        Ok(())
    }

    async fn download(&self, session: &SessionId, path: &str) -> Result<Bytes, LinkError> {
        let result: DataResult = self
            .call_typed(session, LinkMethod::Download, &PathParams { path: path.into() })
            .await?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(result.data.as_bytes())
            .map_err(|e| LinkError::Protocol(format!("Base64 decode error: {}", e)))?;
        Ok(Bytes::from(decoded))
    }
}
