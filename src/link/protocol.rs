//! Wire types for remote file calls.
//!
//! Each call is a `method` plus JSON `params`; each response is a JSON object.
//! Field names match the console API (`src`/`dst`, `insensitive`, `lines`,
//! `atime`/`mtime` as ISO-8601 strings, binary payloads as standard base64).

use serde::{Deserialize, Serialize};

use crate::files::types::{FileEntry, GrepMatch};

// ═══════════════════════════════════════════════════════════════════════════
// Methods
// ═══════════════════════════════════════════════════════════════════════════

/// Every call a [`RemoteLink`](super::RemoteLink) can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    List,
    Mkdir,
    Delete,
    Move,
    Copy,
    Grep,
    Head,
    Tail,
    Chmod,
    Chown,
    Chtimes,
    Upload,
    Download,
}

/// Deadline class of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    /// Directory listing
    Listing,
    /// Small mutating calls (mkdir, rm, mv, cp, chmod, ...)
    Mutation,
    /// Content reads (grep, head, tail)
    Read,
    /// Bulk payloads (upload, download)
    Transfer,
}

impl LinkMethod {
    /// Method name on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            LinkMethod::List => "ls",
            LinkMethod::Mkdir => "mkdir",
            LinkMethod::Delete => "rm",
            LinkMethod::Move => "mv",
            LinkMethod::Copy => "cp",
            LinkMethod::Grep => "grep",
            LinkMethod::Head => "head",
            LinkMethod::Tail => "tail",
            LinkMethod::Chmod => "chmod",
            LinkMethod::Chown => "chown",
            LinkMethod::Chtimes => "chtimes",
            LinkMethod::Upload => "upload",
            LinkMethod::Download => "download",
        }
    }

    pub fn class(&self) -> CallClass {
        match self {
            LinkMethod::List => CallClass::Listing,
            LinkMethod::Grep | LinkMethod::Head | LinkMethod::Tail => CallClass::Read,
            LinkMethod::Upload | LinkMethod::Download => CallClass::Transfer,
            _ => CallClass::Mutation,
        }
    }
}

impl std::fmt::Display for LinkMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request params
// ═══════════════════════════════════════════════════════════════════════════

/// ls / mkdir / rm / download params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathParams {
    pub path: String,
}

/// mv / cp params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrcDstParams {
    pub src: String,
    pub dst: String,
}

/// grep params
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepParams {
    pub path: String,
    pub pattern: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default, rename = "insensitive")]
    pub case_insensitive: bool,
}

/// head / tail params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadTailParams {
    pub path: String,
    pub lines: u32,
}

/// chmod params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChmodParams {
    pub path: String,
    pub mode: String,
    #[serde(default)]
    pub recursive: bool,
}

/// chown params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChownParams {
    pub path: String,
    pub uid: String,
    pub gid: String,
    #[serde(default)]
    pub recursive: bool,
}

/// chtimes params (ISO-8601 timestamps)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChtimesParams {
    pub path: String,
    pub atime: String,
    pub mtime: String,
}

/// upload params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadParams {
    pub path: String,
    /// Standard base64 of the file bytes
    pub data: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════════

/// ls result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Path as resolved by the agent
    #[serde(default)]
    pub path: Option<String>,
}

/// grep result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepResult {
    #[serde(default)]
    pub matches: Vec<GrepMatch>,
}

/// head / tail / download result
///
/// `data` is plain text for head/tail and base64 for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResult {
    pub data: String,
    #[serde(default)]
    pub path: Option<String>,
}
