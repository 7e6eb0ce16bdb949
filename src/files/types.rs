//! Remote file data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// File entry information
///
/// Read-only projection of remote agent state; a fresh listing always
/// replaces entries wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File name (not full path)
    pub name: String,
    pub is_dir: bool,
    /// File size in bytes
    #[serde(default)]
    pub size: u64,
    /// Last modified time
    pub mod_time: DateTime<Utc>,
    /// Mode string as reported by the agent (e.g. `-rw-r--r--`)
    #[serde(default)]
    pub mode: String,
    /// Symlink target, if the entry is a link
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub link: Option<String>,
}

impl FileEntry {
    pub fn file(name: impl Into<String>, size: u64, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            mod_time,
            mode: "-rw-r--r--".to_string(),
            link: None,
        }
    }

    pub fn dir(name: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            mod_time,
            mode: "drwxr-xr-x".to_string(),
            link: None,
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.link.is_some()
    }
}

/// Agents report "no link" as an empty string
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// A directory listing as last fetched from the remote agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<FileEntry>,
}

impl DirectoryListing {
    pub fn new(path: impl Into<String>, entries: Vec<FileEntry>) -> Self {
        Self {
            path: path.into(),
            entries,
        }
    }

    /// Look up an entry by name
    pub fn entry(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Directories only, in listing order
    pub fn directories(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.is_dir)
    }
}

/// A single grep hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepMatch {
    pub path: String,
    pub line_number: u64,
    pub line: String,
}
