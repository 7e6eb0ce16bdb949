//! In-memory remote filesystem
//!
//! A [`RemoteLink`] that executes every call against a single in-process tree.
//! Used as the test double for the file components and for offline demos.
//! Supports per-(method, path) failure injection, call counting and an
//! artificial upload delay.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::RegexBuilder;
use tracing::debug;

use super::error::LinkError;
use super::protocol::{GrepParams, LinkMethod};
use super::RemoteLink;
use crate::files::path::{file_name, is_within, normalize, parent, ROOT};
use crate::files::types::{FileEntry, GrepMatch};
use crate::session::SessionId;

/// Wildcard path for [`MemoryLink::fail_on`]
pub const ANY_PATH: &str = "*";

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Bytes),
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    mode: u32,
    uid: String,
    gid: String,
    atime: DateTime<Utc>,
    mtime: DateTime<Utc>,
}

impl Node {
    fn dir(now: DateTime<Utc>) -> Self {
        Self::with_kind(NodeKind::Dir, 0o755, now)
    }

    fn file(data: Bytes, now: DateTime<Utc>) -> Self {
        Self::with_kind(NodeKind::File(data), 0o644, now)
    }

    fn with_kind(kind: NodeKind, mode: u32, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            mode,
            uid: "0".to_string(),
            gid: "0".to_string(),
            atime: now,
            mtime: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn to_entry(&self, path: &str) -> FileEntry {
        let (is_dir, size, link, type_char) = match &self.kind {
            NodeKind::Dir => (true, 0, None, 'd'),
            NodeKind::File(data) => (false, data.len() as u64, None, '-'),
            NodeKind::Symlink(target) => (false, 0, Some(target.clone()), 'L'),
        };
        FileEntry {
            name: file_name(path).unwrap_or_else(|| ROOT.to_string()),
            is_dir,
            size,
            mod_time: self.mtime,
            mode: format_mode(type_char, self.mode),
            link,
        }
    }
}

/// Render permission bits the way agents report them (`drwxr-xr-x`)
fn format_mode(type_char: char, bits: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(type_char);
    for shift in [6u32, 3, 0] {
        let triple = (bits >> shift) & 0o7;
        out.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        out.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        out.push(if triple & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

fn no_such_file(path: &str) -> LinkError {
    LinkError::remote(format!("{}: no such file or directory", path))
}

pub struct MemoryLink {
    nodes: Mutex<BTreeMap<String, Node>>,
    failures: Mutex<HashMap<(LinkMethod, String), LinkError>>,
    calls: Mutex<Vec<(LinkMethod, String)>>,
    upload_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
}

impl MemoryLink {
    /// Empty filesystem containing only `/`
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), Node::dir(Utc::now()));
        Self {
            nodes: Mutex::new(nodes),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            upload_delay: Mutex::new(None),
            list_delay: Mutex::new(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Fixture setup & inspection
    // ═══════════════════════════════════════════════════════════════════

    /// Create a directory and any missing parents
    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.lock();
        Self::ensure_dirs(&mut nodes, &normalize(path));
    }

    /// Create (or overwrite) a file, creating missing parents
    pub fn add_file(&self, path: &str, contents: impl Into<Bytes>) {
        let path = normalize(path);
        let mut nodes = self.nodes.lock();
        Self::ensure_dirs(&mut nodes, &parent(&path));
        nodes.insert(path, Node::file(contents.into(), Utc::now()));
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        let path = normalize(path);
        let mut nodes = self.nodes.lock();
        Self::ensure_dirs(&mut nodes, &parent(&path));
        nodes.insert(
            path,
            Node::with_kind(NodeKind::Symlink(target.to_string()), 0o777, Utc::now()),
        );
    }

    fn ensure_dirs(nodes: &mut BTreeMap<String, Node>, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            nodes
                .entry(current.clone())
                .or_insert_with(|| Node::dir(Utc::now()));
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(&normalize(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.nodes
            .lock()
            .get(&normalize(path))
            .map(Node::is_dir)
            .unwrap_or(false)
    }

    /// File contents, if `path` is a regular file
    pub fn read(&self, path: &str) -> Option<Bytes> {
        match self.nodes.lock().get(&normalize(path)).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn mode_of(&self, path: &str) -> Option<u32> {
        self.nodes.lock().get(&normalize(path)).map(|n| n.mode)
    }

    pub fn owner_of(&self, path: &str) -> Option<(String, String)> {
        self.nodes
            .lock()
            .get(&normalize(path))
            .map(|n| (n.uid.clone(), n.gid.clone()))
    }

    /// (access time, modification time)
    pub fn times_of(&self, path: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.nodes
            .lock()
            .get(&normalize(path))
            .map(|n| (n.atime, n.mtime))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Failure injection & call accounting
    // ═══════════════════════════════════════════════════════════════════

    /// Make `method` fail for `path` (or every path with [`ANY_PATH`])
    pub fn fail_on(&self, method: LinkMethod, path: &str, error: LinkError) {
        let key_path = if path == ANY_PATH {
            ANY_PATH.to_string()
        } else {
            normalize(path)
        };
        self.failures.lock().insert((method, key_path), error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Delay applied before each upload is written
    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock() = Some(delay);
    }

    /// Delay applied after each listing is read and before it is returned
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    /// Number of calls made for `method`
    pub fn calls(&self, method: LinkMethod) -> usize {
        self.calls.lock().iter().filter(|(m, _)| *m == method).count()
    }

    /// Paths passed to `method`, in call order
    pub fn call_paths(&self, method: LinkMethod) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Record the call and return an injected failure, if any
    fn enter_call(
        &self,
        session: &SessionId,
        method: LinkMethod,
        paths: &[&str],
    ) -> Result<(), LinkError> {
        let primary = paths.first().map(|p| normalize(p)).unwrap_or_default();
        debug!("[memory-link] {} {} {}", session, method, primary);
        self.calls.lock().push((method, primary));

        let failures = self.failures.lock();
        if let Some(err) = failures.get(&(method, ANY_PATH.to_string())) {
            return Err(err.clone());
        }
        for path in paths {
            if let Some(err) = failures.get(&(method, normalize(path))) {
                return Err(err.clone());
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Tree helpers (callers hold the nodes lock)
    // ═══════════════════════════════════════════════════════════════════

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> Result<(), LinkError> {
        let parent_path = parent(path);
        match nodes.get(&parent_path) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(LinkError::remote(format!("{}: not a directory", parent_path))),
            None => Err(no_such_file(&parent_path)),
        }
    }

    /// `path` and every key beneath it
    fn subtree_keys(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        nodes
            .keys()
            .filter(|k| is_within(k, path))
            .cloned()
            .collect()
    }

    fn rebase(key: &str, from: &str, to: &str) -> String {
        format!("{}{}", to, &key[from.len()..])
    }

    fn update_subtree<F>(&self, path: &str, recursive: bool, mut apply: F) -> Result<(), LinkError>
    where
        F: FnMut(&mut Node),
    {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(path) {
            return Err(no_such_file(path));
        }
        let keys = if recursive {
            Self::subtree_keys(&nodes, path)
        } else {
            vec![path.to_string()]
        };
        for key in keys {
            if let Some(node) = nodes.get_mut(&key) {
                apply(node);
            }
        }
        Ok(())
    }

    fn regular_file_lines(&self, path: &str) -> Result<Vec<String>, LinkError> {
        let nodes = self.nodes.lock();
        match nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => Ok(String::from_utf8_lossy(data)
                .lines()
                .map(str::to_string)
                .collect()),
            Some(_) => Err(LinkError::remote(format!("{}: not a regular file", path))),
            None => Err(no_such_file(path)),
        }
    }
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteLink for MemoryLink {
    async fn list(&self, session: &SessionId, path: &str) -> Result<Vec<FileEntry>, LinkError> {
        self.enter_call(session, LinkMethod::List, &[path])?;
        let path = normalize(path);
        let entries: Vec<FileEntry> = {
            let nodes = self.nodes.lock();
            match nodes.get(&path) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(LinkError::remote(format!("{}: not a directory", path))),
                None => return Err(no_such_file(&path)),
            }
            nodes
                .iter()
                .filter(|(k, _)| k.as_str() != ROOT && parent(k) == path)
                .map(|(k, n)| n.to_entry(k))
                .collect()
        };

        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(entries)
    }

    async fn mkdir(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Mkdir, &[path])?;
        let path = normalize(path);
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(&path) {
            return Err(LinkError::remote(format!("{}: file exists", path)));
        }
        Self::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, Node::dir(Utc::now()));
        Ok(())
    }

    async fn delete(&self, session: &SessionId, path: &str) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Delete, &[path])?;
        let path = normalize(path);
        if path == ROOT {
            return Err(LinkError::remote("refusing to remove /"));
        }
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(&path) {
            return Err(no_such_file(&path));
        }
        if Self::subtree_keys(&nodes, &path).len() > 1 {
            return Err(LinkError::remote(format!("{}: directory not empty", path)));
        }
        nodes.remove(&path);
        Ok(())
    }

    async fn move_entry(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Move, &[src, dst])?;
        let (src, dst) = (normalize(src), normalize(dst));
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(&src) {
            return Err(no_such_file(&src));
        }
        if is_within(&dst, &src) {
            return Err(LinkError::remote(format!(
                "cannot move {} into itself ({})",
                src, dst
            )));
        }
        if nodes.get(&dst).map(Node::is_dir).unwrap_or(false) {
            return Err(LinkError::remote(format!("{}: file exists", dst)));
        }
        Self::require_parent_dir(&nodes, &dst)?;

        for key in Self::subtree_keys(&nodes, &src) {
            if let Some(node) = nodes.remove(&key) {
                nodes.insert(Self::rebase(&key, &src, &dst), node);
            }
        }
        Ok(())
    }

    async fn copy(&self, session: &SessionId, src: &str, dst: &str) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Copy, &[src, dst])?;
        let (src, dst) = (normalize(src), normalize(dst));
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(&src) {
            return Err(no_such_file(&src));
        }
        if is_within(&dst, &src) {
            return Err(LinkError::remote(format!(
                "cannot copy {} into itself ({})",
                src, dst
            )));
        }
        if nodes.get(&dst).map(Node::is_dir).unwrap_or(false) {
            return Err(LinkError::remote(format!("{}: file exists", dst)));
        }
        Self::require_parent_dir(&nodes, &dst)?;

        let now = Utc::now();
        let copies: Vec<(String, Node)> = Self::subtree_keys(&nodes, &src)
            .into_iter()
            .filter_map(|key| {
                nodes.get(&key).map(|node| {
                    let mut copy = node.clone();
                    copy.mtime = now;
                    (Self::rebase(&key, &src, &dst), copy)
                })
            })
            .collect();
        nodes.extend(copies);
        Ok(())
    }

    async fn grep(
        &self,
        session: &SessionId,
        params: &GrepParams,
    ) -> Result<Vec<GrepMatch>, LinkError> {
        self.enter_call(session, LinkMethod::Grep, &[params.path.as_str()])?;
        let regex = RegexBuilder::new(&params.pattern)
            .case_insensitive(params.case_insensitive)
            .build()
            .map_err(|e| LinkError::remote(format!("invalid pattern: {}", e)))?;

        let root = normalize(&params.path);
        let nodes = self.nodes.lock();
        let root_node = nodes.get(&root).ok_or_else(|| no_such_file(&root))?;

        let candidates: Vec<(&str, &Bytes)> = if root_node.is_dir() {
            nodes
                .iter()
                .filter(|(k, _)| {
                    if params.recursive {
                        k.as_str() != root && is_within(k, &root)
                    } else {
                        k.as_str() != ROOT && parent(k) == root
                    }
                })
                .filter_map(|(k, n)| match &n.kind {
                    NodeKind::File(data) => Some((k.as_str(), data)),
                    _ => None,
                })
                .collect()
        } else {
            match &root_node.kind {
                NodeKind::File(data) => vec![(root.as_str(), data)],
                _ => Vec::new(),
            }
        };

        let mut matches = Vec::new();
        for (path, data) in candidates {
            let text = String::from_utf8_lossy(data);
            for (idx, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(GrepMatch {
                        path: path.to_string(),
                        line_number: idx as u64 + 1,
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(matches)
    }

    async fn head(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        self.enter_call(session, LinkMethod::Head, &[path])?;
        let all = self.regular_file_lines(&normalize(path))?;
        Ok(all
            .into_iter()
            .take(lines as usize)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn tail(&self, session: &SessionId, path: &str, lines: u32) -> Result<String, LinkError> {
        self.enter_call(session, LinkMethod::Tail, &[path])?;
        let all = self.regular_file_lines(&normalize(path))?;
        let skip = all.len().saturating_sub(lines as usize);
        Ok(all[skip..].join("\n"))
    }

    async fn chmod(
        &self,
        session: &SessionId,
        path: &str,
        mode: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Chmod, &[path])?;
        let bits = u32::from_str_radix(mode, 8)
            .map_err(|_| LinkError::remote(format!("invalid mode: {}", mode)))?;
        self.update_subtree(&normalize(path), recursive, |node| {
            node.mode = bits & 0o7777;
        })
    }

    async fn chown(
        &self,
        session: &SessionId,
        path: &str,
        uid: &str,
        gid: &str,
        recursive: bool,
    ) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Chown, &[path])?;
        self.update_subtree(&normalize(path), recursive, |node| {
            node.uid = uid.to_string();
            node.gid = gid.to_string();
        })
    }

    async fn chtimes(
        &self,
        session: &SessionId,
        path: &str,
        access_time: DateTime<Utc>,
        modify_time: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Chtimes, &[path])?;
        self.update_subtree(&normalize(path), false, |node| {
            node.atime = access_time;
            node.mtime = modify_time;
        })
    }

    async fn upload(
        &self,
        session: &SessionId,
        dest_path: &str,
        data: Bytes,
    ) -> Result<(), LinkError> {
        self.enter_call(session, LinkMethod::Upload, &[dest_path])?;
        let delay = *self.upload_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let path = normalize(dest_path);
        let mut nodes = self.nodes.lock();
        if nodes.get(&path).map(Node::is_dir).unwrap_or(false) {
            return Err(LinkError::remote(format!("{}: is a directory", path)));
        }
        Self::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, Node::file(data, Utc::now()));
        Ok(())
    }

    async fn download(&self, session: &SessionId, path: &str) -> Result<Bytes, LinkError> {
        self.enter_call(session, LinkMethod::Download, &[path])?;
        let path = normalize(path);
        match self.nodes.lock().get(&path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => Ok(data.clone()),
            Some(_) => Err(LinkError::remote(format!("{}: not a regular file", path))),
            None => Err(no_such_file(&path)),
        }
    }
}
