//! Session Types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of the remote agent a call targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier (used for locally created sessions and tests)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Operating system family reported by the remote agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Posix,
}

impl OsFamily {
    /// Map an agent-reported OS string (`windows`, `linux`, `darwin`, ...) to a family
    pub fn from_os_name(os: &str) -> Self {
        if os.trim().eq_ignore_ascii_case("windows") {
            OsFamily::Windows
        } else {
            OsFamily::Posix
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsFamily::Windows)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Windows => f.write_str("windows"),
            OsFamily::Posix => f.write_str("posix"),
        }
    }
}

/// A live connection to a remote agent. Immutable for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub os: OsFamily,
    /// Display name (hostname or operator-chosen label)
    #[serde(default)]
    pub name: String,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, os: OsFamily) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            os,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn posix(id: impl Into<SessionId>) -> Self {
        Self::new(id, OsFamily::Posix)
    }

    pub fn windows(id: impl Into<SessionId>) -> Self {
        Self::new(id, OsFamily::Windows)
    }
}
