//! Remote path navigation
//!
//! Pure string handling for slash-separated absolute remote paths. Nothing here
//! performs I/O or enforces access rules; the remote agent is the authority on
//! what a path means. Malformed input degrades toward `/` instead of erroring.

use serde::{Deserialize, Serialize};

/// Root of every remote path
pub const ROOT: &str = "/";

/// Normalize a remote path.
///
/// Collapses repeated separators, guarantees a leading `/`, drops a trailing
/// `/` and maps empty input to the root. Idempotent.
///
/// # Examples
/// ```
/// use remote_files::files::path::normalize;
/// assert_eq!(normalize("//a//b/"), "/a/b");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = segments(path).collect();
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Non-empty segments of a path, in order.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim().split('/').filter(|s| !s.is_empty())
}

/// Path of a child entry inside `current`.
pub fn enter(current: &str, child_name: &str) -> String {
    let current = normalize(current);
    let child = child_name.trim().trim_matches('/');
    if child.is_empty() {
        return current;
    }
    if current == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", current, child)
    }
}

/// Drop the last segment. `up("/")` stays at the root.
pub fn up(current: &str) -> String {
    let normalized = normalize(current);
    match normalized.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(idx) => normalized[..idx].to_string(),
    }
}

/// Parent directory of a path (same rule as [`up`]).
pub fn parent(path: &str) -> String {
    up(path)
}

/// Last segment of a path, or `None` for the root.
pub fn file_name(path: &str) -> Option<String> {
    segments(path).last().map(str::to_string)
}

/// Check whether `path` is `ancestor` or lies beneath it (segment-aware).
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || (path.starts_with(&ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Join remote path components using `/` separator.
///
/// Remote paths always use `/` regardless of the local or remote OS.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// One navigable segment of the current path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Segment name as displayed
    pub name: String,
    /// Absolute path up to and including this segment
    pub path: String,
}

/// Breadcrumb segments for `current`; empty for the root.
pub fn breadcrumbs(current: &str) -> Vec<Breadcrumb> {
    let mut cumulative = String::new();
    segments(current)
        .map(|segment| {
            cumulative.push('/');
            cumulative.push_str(segment);
            Breadcrumb {
                name: segment.to_string(),
                path: cumulative.clone(),
            }
        })
        .collect()
}

/// Current working directory of one file browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNavigator {
    cwd: String,
}

impl PathNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            cwd: normalize(start),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn is_root(&self) -> bool {
        self.cwd == ROOT
    }

    /// Jump to an arbitrary (typed-in) path
    pub fn navigate(&mut self, path: &str) -> &str {
        self.cwd = normalize(path);
        &self.cwd
    }

    pub fn enter(&mut self, child_name: &str) -> &str {
        self.cwd = enter(&self.cwd, child_name);
        &self.cwd
    }

    pub fn up(&mut self) -> &str {
        self.cwd = up(&self.cwd);
        &self.cwd
    }

    pub fn home(&mut self) -> &str {
        self.cwd = ROOT.to_string();
        &self.cwd
    }

    /// Absolute path of an entry in the current directory
    pub fn child_path(&self, name: &str) -> String {
        enter(&self.cwd, name)
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        breadcrumbs(&self.cwd)
    }
}

impl Default for PathNavigator {
    fn default() -> Self {
        Self::new(ROOT)
    }
}
