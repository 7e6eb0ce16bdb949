//! Extended file operations
//!
//! Validates an [`OperationRequest`], issues exactly one [`RemoteLink`] call for
//! it and reports which cached listings the call made stale. Nothing is retried.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::InvalidationSet;
use super::error::FileOpError;
use super::path::normalize;
use super::types::GrepMatch;
use crate::config::OperationDefaults;
use crate::link::{GrepParams, LinkError, RemoteLink};
use crate::session::Session;

/// Default line count for head/tail
pub const DEFAULT_LINES: u32 = 10;

/// Path-scoped operations the dispatcher understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationRequest {
    Mkdir {
        path: String,
    },
    Delete {
        path: String,
    },
    Move {
        src: String,
        dst: String,
    },
    Copy {
        src: String,
        dst: String,
    },
    Grep {
        path: String,
        pattern: String,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// `lines: None` uses the configured default
    Head {
        path: String,
        #[serde(default)]
        lines: Option<u32>,
    },
    Tail {
        path: String,
        #[serde(default)]
        lines: Option<u32>,
    },
    Chmod {
        path: String,
        /// Octal, e.g. `644` or `0755`
        mode: String,
        #[serde(default)]
        recursive: bool,
    },
    Chown {
        path: String,
        uid: String,
        gid: String,
        #[serde(default)]
        recursive: bool,
    },
    /// Timestamps as RFC3339 or `YYYY-MM-DDTHH:MM[:SS]` (UTC)
    Chtimes {
        path: String,
        access_time: String,
        modify_time: String,
    },
}

impl OperationRequest {
    pub fn mkdir(path: impl Into<String>) -> Self {
        OperationRequest::Mkdir { path: path.into() }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        OperationRequest::Delete { path: path.into() }
    }

    pub fn move_entry(src: impl Into<String>, dst: impl Into<String>) -> Self {
        OperationRequest::Move {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn copy(src: impl Into<String>, dst: impl Into<String>) -> Self {
        OperationRequest::Copy {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn grep(
        path: impl Into<String>,
        pattern: impl Into<String>,
        recursive: bool,
        case_insensitive: bool,
    ) -> Self {
        OperationRequest::Grep {
            path: path.into(),
            pattern: pattern.into(),
            recursive,
            case_insensitive,
        }
    }

    pub fn head(path: impl Into<String>) -> Self {
        OperationRequest::Head {
            path: path.into(),
            lines: None,
        }
    }

    pub fn head_lines(path: impl Into<String>, lines: u32) -> Self {
        OperationRequest::Head {
            path: path.into(),
            lines: Some(lines),
        }
    }

    pub fn tail(path: impl Into<String>) -> Self {
        OperationRequest::Tail {
            path: path.into(),
            lines: None,
        }
    }

    pub fn tail_lines(path: impl Into<String>, lines: u32) -> Self {
        OperationRequest::Tail {
            path: path.into(),
            lines: Some(lines),
        }
    }

    pub fn chmod(path: impl Into<String>, mode: impl Into<String>, recursive: bool) -> Self {
        OperationRequest::Chmod {
            path: path.into(),
            mode: mode.into(),
            recursive,
        }
    }

    pub fn chown(
        path: impl Into<String>,
        uid: impl Into<String>,
        gid: impl Into<String>,
        recursive: bool,
    ) -> Self {
        OperationRequest::Chown {
            path: path.into(),
            uid: uid.into(),
            gid: gid.into(),
            recursive,
        }
    }

    pub fn chtimes(
        path: impl Into<String>,
        access_time: impl Into<String>,
        modify_time: impl Into<String>,
    ) -> Self {
        OperationRequest::Chtimes {
            path: path.into(),
            access_time: access_time.into(),
            modify_time: modify_time.into(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Mkdir { .. } => OperationKind::Mkdir,
            OperationRequest::Delete { .. } => OperationKind::Delete,
            OperationRequest::Move { .. } => OperationKind::Move,
            OperationRequest::Copy { .. } => OperationKind::Copy,
            OperationRequest::Grep { .. } => OperationKind::Grep,
            OperationRequest::Head { .. } => OperationKind::Head,
            OperationRequest::Tail { .. } => OperationKind::Tail,
            OperationRequest::Chmod { .. } => OperationKind::Chmod,
            OperationRequest::Chown { .. } => OperationKind::Chown,
            OperationRequest::Chtimes { .. } => OperationKind::Chtimes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
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
}

impl OperationKind {
    /// Whether the operation changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            OperationKind::Grep | OperationKind::Head | OperationKind::Tail
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Mkdir => "mkdir",
            OperationKind::Delete => "delete",
            OperationKind::Move => "move",
            OperationKind::Copy => "copy",
            OperationKind::Grep => "grep",
            OperationKind::Head => "head",
            OperationKind::Tail => "tail",
            OperationKind::Chmod => "chmod",
            OperationKind::Chown => "chown",
            OperationKind::Chtimes => "chtimes",
        };
        f.write_str(name)
    }
}

/// What a successful operation produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OperationOutput {
    Completed,
    Matches(Vec<GrepMatch>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub output: OperationOutput,
    /// Listings the caller must drop from its cache
    pub invalidate: InvalidationSet,
}

impl OperationOutcome {
    fn completed(invalidate: InvalidationSet) -> Self {
        Self {
            output: OperationOutput::Completed,
            invalidate,
        }
    }

    fn read(output: OperationOutput) -> Self {
        Self {
            output,
            invalidate: InvalidationSet::new(),
        }
    }

    pub fn matches(&self) -> Option<&[GrepMatch]> {
        match &self.output {
            OperationOutput::Matches(m) => Some(m),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.output {
            OperationOutput::Text(t) => Some(t),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation helpers
// ═══════════════════════════════════════════════════════════════════════════

fn require_path(field: &str, value: &str) -> Result<String, FileOpError> {
    if value.trim().is_empty() {
        return Err(FileOpError::validation(format!("{} is required", field)));
    }
    Ok(normalize(value))
}

fn require_distinct(src: &str, dst: &str) -> Result<(), FileOpError> {
    if src == dst {
        return Err(FileOpError::validation(format!(
            "source and destination are the same: {}",
            src
        )));
    }
    Ok(())
}

/// Three or four octal digits
fn validate_mode(mode: &str) -> Result<String, FileOpError> {
    let mode = mode.trim();
    let octal = (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c));
    if !octal {
        return Err(FileOpError::validation(format!(
            "mode must be 3 or 4 octal digits, got '{}'",
            mode
        )));
    }
    Ok(mode.to_string())
}

fn validate_lines(lines: u32) -> Result<u32, FileOpError> {
    if lines == 0 {
        return Err(FileOpError::validation("line count must be positive"));
    }
    Ok(lines)
}

/// Parse RFC3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` taken as UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, FileOpError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| FileOpError::validation(format!("invalid timestamp '{}'", value)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Dispatcher
// ═══════════════════════════════════════════════════════════════════════════

pub struct OperationDispatcher {
    link: Arc<dyn RemoteLink>,
    defaults: OperationDefaults,
}

impl OperationDispatcher {
    pub fn new(link: Arc<dyn RemoteLink>) -> Self {
        Self::with_defaults(link, OperationDefaults::default())
    }

    pub fn with_defaults(link: Arc<dyn RemoteLink>, defaults: OperationDefaults) -> Self {
        Self { link, defaults }
    }

    /// Validate and run one operation for `session`
    pub async fn dispatch(
        &self,
        session: &Session,
        request: OperationRequest,
    ) -> Result<OperationOutcome, FileOpError> {
        let kind = request.kind();
        debug!("[ops] {} {} {:?}", session.id, kind, request);

        let result = self.run(session, request).await;
        match &result {
            Ok(outcome) if kind.is_mutation() => info!(
                "[ops] {} {} completed ({} exact, {} subtree invalidation(s))",
                session.id,
                kind,
                outcome.invalidate.exact.len(),
                outcome.invalidate.subtrees.len()
            ),
            Ok(_) => debug!("[ops] {} {} completed", session.id, kind),
            Err(e) => warn!("[ops] {} {} failed: {}", session.id, kind, e),
        }
        result
    }

    async fn run(
        &self,
        session: &Session,
        request: OperationRequest,
    ) -> Result<OperationOutcome, FileOpError> {
        let kind = request.kind();
        let id = &session.id;
        let remote = |e: LinkError| FileOpError::remote(kind.to_string(), e);

        match request {
            OperationRequest::Mkdir { path } => {
                let path = require_path("path", &path)?;
                self.link.mkdir(id, &path).await.map_err(remote)?;
                let mut set = InvalidationSet::new();
                set.touch(&path).drop_path(&path);
                Ok(OperationOutcome::completed(set))
            }
            OperationRequest::Delete { path } => {
                let path = require_path("path", &path)?;
                self.link.delete(id, &path).await.map_err(remote)?;
                let mut set = InvalidationSet::new();
                set.touch(&path).drop_path(&path).drop_subtree(&path);
                Ok(OperationOutcome::completed(set))
            }
            OperationRequest::Move { src, dst } => {
                let src = require_path("source", &src)?;
                let dst = require_path("destination", &dst)?;
                require_distinct(&src, &dst)?;
                self.link.move_entry(id, &src, &dst).await.map_err(remote)?;
                let mut set = InvalidationSet::new();
                set.touch(&src)
                    .touch(&dst)
                    .drop_subtree(&src)
                    .drop_path(&dst);
                Ok(OperationOutcome::completed(set))
            }
            OperationRequest::Copy { src, dst } => {
                let src = require_path("source", &src)?;
                let dst = require_path("destination", &dst)?;
                require_distinct(&src, &dst)?;
                self.link.copy(id, &src, &dst).await.map_err(remote)?;
                // The source is left as it was
                let mut set = InvalidationSet::new();
                set.touch(&dst).drop_path(&dst);
                Ok(OperationOutcome::completed(set))
            }
            OperationRequest::Grep {
                path,
                pattern,
                recursive,
                case_insensitive,
            } => {
                let path = require_path("path", &path)?;
                if pattern.is_empty() {
                    return Err(FileOpError::validation("pattern is required"));
                }
                let params = GrepParams {
                    path,
                    pattern,
                    recursive,
                    case_insensitive,
                };
                let matches = self.link.grep(id, &params).await.map_err(remote)?;
                Ok(OperationOutcome::read(OperationOutput::Matches(matches)))
            }
            OperationRequest::Head { path, lines } => {
                let path = require_path("path", &path)?;
                let lines = validate_lines(lines.unwrap_or(self.defaults.head_tail_lines))?;
                let text = self.link.head(id, &path, lines).await.map_err(remote)?;
                Ok(OperationOutcome::read(OperationOutput::Text(text)))
            }
            OperationRequest::Tail { path, lines } => {
                let path = require_path("path", &path)?;
                let lines = validate_lines(lines.unwrap_or(self.defaults.head_tail_lines))?;
                let text = self.link.tail(id, &path, lines).await.map_err(remote)?;
                Ok(OperationOutcome::read(OperationOutput::Text(text)))
            }
            OperationRequest::Chmod {
                path,
                mode,
                recursive,
            } => {
                let path = require_path("path", &path)?;
                let mode = validate_mode(&mode)?;
                if session.os.is_windows() {
                    warn!(
                        "[ops] chmod on windows session {}: only the read-only bit applies",
                        id
                    );
                }
                self.link
                    .chmod(id, &path, &mode, recursive)
                    .await
                    .map_err(remote)?;
                Ok(OperationOutcome::completed(ownership_set(&path, recursive)))
            }
            OperationRequest::Chown {
                path,
                uid,
                gid,
                recursive,
            } => {
                let path = require_path("path", &path)?;
                let (uid, gid) = (uid.trim(), gid.trim());
                if uid.is_empty() || gid.is_empty() {
                    return Err(FileOpError::validation("both uid and gid are required"));
                }
                if session.os.is_windows() {
                    return Err(FileOpError::validation(
                        "chown is not supported on windows sessions",
                    ));
                }
                self.link
                    .chown(id, &path, uid, gid, recursive)
                    .await
                    .map_err(remote)?;
                Ok(OperationOutcome::completed(ownership_set(&path, recursive)))
            }
            OperationRequest::Chtimes {
                path,
                access_time,
                modify_time,
            } => {
                let path = require_path("path", &path)?;
                let atime = parse_timestamp(&access_time)?;
                let mtime = parse_timestamp(&modify_time)?;
                self.link
                    .chtimes(id, &path, atime, mtime)
                    .await
                    .map_err(remote)?;
                let mut set = InvalidationSet::new();
                set.touch(&path);
                Ok(OperationOutcome::completed(set))
            }
        }
    }
}

/// chmod/chown: the parent shows the new bits; recursion reaches everything below
fn ownership_set(path: &str, recursive: bool) -> InvalidationSet {
    let mut set = InvalidationSet::new();
    set.touch(path);
    if recursive {
        set.drop_subtree(path);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkMethod, MemoryLink};

    fn setup() -> (Arc<MemoryLink>, OperationDispatcher) {
        let link = Arc::new(MemoryLink::new());
        let dispatcher = OperationDispatcher::new(link.clone());
        (link, dispatcher)
    }

    fn set_of(exact: &[&str], subtrees: &[&str]) -> InvalidationSet {
        InvalidationSet {
            exact: exact.iter().map(|s| s.to_string()).collect(),
            subtrees: subtrees.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let full = parse_timestamp("2024-05-06T07:08:09Z").unwrap();
        assert_eq!(full.to_rfc3339(), "2024-05-06T07:08:09+00:00");

        let offset = parse_timestamp("2024-05-06T09:08:09+02:00").unwrap();
        assert_eq!(offset, full);

        let minutes = parse_timestamp("2024-05-06T07:08").unwrap();
        assert_eq!(minutes.to_rfc3339(), "2024-05-06T07:08:00+00:00");

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_validate_mode() {
        assert!(validate_mode("644").is_ok());
        assert!(validate_mode("0755").is_ok());
        assert!(validate_mode("64").is_err());
        assert!(validate_mode("888").is_err());
        assert!(validate_mode("rwx").is_err());
    }

    #[tokio::test]
    async fn test_validation_never_calls_remote() {
        let (link, ops) = setup();
        let session = Session::posix("s");

        let requests = vec![
            OperationRequest::mkdir("  "),
            OperationRequest::move_entry("/a", ""),
            OperationRequest::copy("/a/", "//a"),
            OperationRequest::grep("/var", "", false, false),
            OperationRequest::head_lines("/f", 0),
            OperationRequest::chmod("/f", "9", false),
            OperationRequest::chown("/f", "root", "", false),
            OperationRequest::chtimes("/f", "not-a-time", "2024-01-01T00:00:00Z"),
        ];
        for request in requests {
            let err = ops.dispatch(&session, request).await.unwrap_err();
            assert!(matches!(err, FileOpError::Validation(_)), "{}", err);
        }
        assert_eq!(link.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_chown_rejected_on_windows() {
        let (link, ops) = setup();
        link.add_file("/C/f.txt", "x");

        let err = ops
            .dispatch(
                &Session::windows("w"),
                OperationRequest::chown("/C/f.txt", "0", "0", false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FileOpError::Validation(_)));
        assert_eq!(link.calls(LinkMethod::Chown), 0);

        // chmod is still dispatched
        ops.dispatch(
            &Session::windows("w"),
            OperationRequest::chmod("/C/f.txt", "444", false),
        )
        .await
        .unwrap();
        assert_eq!(link.mode_of("/C/f.txt"), Some(0o444));
    }

    #[tokio::test]
    async fn test_mkdir_and_delete_invalidation() {
        let (_link, ops) = setup();
        let session = Session::posix("s");

        let outcome = ops
            .dispatch(&session, OperationRequest::mkdir("/new/"))
            .await
            .unwrap();
        assert_eq!(outcome.output, OperationOutput::Completed);
        assert_eq!(outcome.invalidate, set_of(&["/", "/new"], &[]));

        let outcome = ops
            .dispatch(&session, OperationRequest::delete("/new"))
            .await
            .unwrap();
        assert_eq!(outcome.invalidate, set_of(&["/", "/new"], &["/new"]));
    }

    #[tokio::test]
    async fn test_move_invalidation() {
        let (link, ops) = setup();
        link.add_dir("/a/x");
        link.add_dir("/b");

        let outcome = ops
            .dispatch(
                &Session::posix("s"),
                OperationRequest::move_entry("/a/x", "/b/x"),
            )
            .await
            .unwrap();
        assert!(outcome.invalidate.covers("/a"));
        assert!(outcome.invalidate.covers("/b"));
        assert!(outcome.invalidate.covers("/a/x/deep"));
        assert!(!outcome.invalidate.covers("/c"));
        assert!(link.is_dir("/b/x"));
    }

    #[tokio::test]
    async fn test_copy_invalidates_destination_only() {
        let (link, ops) = setup();
        link.add_file("/a/f", "payload");
        link.add_dir("/b");

        let outcome = ops
            .dispatch(&Session::posix("s"), OperationRequest::copy("/a/f", "/b/f"))
            .await
            .unwrap();
        assert_eq!(outcome.invalidate, set_of(&["/b", "/b/f"], &[]));
        assert!(!outcome.invalidate.covers("/a"));
        assert_eq!(link.read("/a/f").as_deref(), Some(&b"payload"[..]));
        assert_eq!(link.read("/b/f").as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_grep_returns_ordered_matches_without_invalidation() {
        let (link, ops) = setup();
        link.add_file("/var/log/auth.log", "ok\nERROR denied\n");
        link.add_file("/var/log/sys/kern.log", "ERROR oops\nerror quiet\n");

        let outcome = ops
            .dispatch(
                &Session::posix("s"),
                OperationRequest::grep("/var/log", "ERROR", true, false),
            )
            .await
            .unwrap();
        let matches = outcome.matches().unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, "/var/log/auth.log");
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(matches[1].path, "/var/log/sys/kern.log");
        assert!(outcome.invalidate.is_empty());
    }

    #[tokio::test]
    async fn test_head_uses_default_line_count() {
        let (link, ops) = setup();
        let body: String = (1..=20).map(|i| format!("line {}\n", i)).collect();
        link.add_file("/f", body);

        let outcome = ops
            .dispatch(&Session::posix("s"), OperationRequest::head("/f"))
            .await
            .unwrap();
        assert_eq!(outcome.text().unwrap().lines().count(), 10);

        let outcome = ops
            .dispatch(&Session::posix("s"), OperationRequest::tail_lines("/f", 1))
            .await
            .unwrap();
        assert_eq!(outcome.text(), Some("line 20"));
    }

    #[tokio::test]
    async fn test_remote_failure_surfaces_without_invalidation() {
        let (link, ops) = setup();
        link.add_file("/tmp/f", "x");
        link.fail_on(
            LinkMethod::Chmod,
            "/tmp/f",
            LinkError::remote("permission denied"),
        );

        let err = ops
            .dispatch(
                &Session::posix("s"),
                OperationRequest::chmod("/tmp/f", "644", false),
            )
            .await
            .unwrap_err();
        match err {
            FileOpError::Remote { operation, source } => {
                assert_eq!(operation, "chmod");
                assert_eq!(source.message(), "permission denied");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(link.calls(LinkMethod::Chmod), 1);
    }

    #[tokio::test]
    async fn test_recursive_chmod_drops_subtree() {
        let (link, ops) = setup();
        link.add_file("/srv/www/index.html", "<html>");

        let outcome = ops
            .dispatch(
                &Session::posix("s"),
                OperationRequest::chmod("/srv/www", "0750", true),
            )
            .await
            .unwrap();
        assert_eq!(outcome.invalidate, set_of(&["/srv"], &["/srv/www"]));
        assert_eq!(link.mode_of("/srv/www/index.html"), Some(0o750));
    }

    #[tokio::test]
    async fn test_chtimes_applies_parsed_times() {
        let (link, ops) = setup();
        link.add_file("/f", "x");

        ops.dispatch(
            &Session::posix("s"),
            OperationRequest::chtimes("/f", "2020-01-01T00:00", "2021-06-01T12:30:00Z"),
        )
        .await
        .unwrap();
        let (atime, mtime) = link.times_of("/f").unwrap();
        assert_eq!(atime.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert_eq!(mtime.to_rfc3339(), "2021-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(OperationRequest::head("/etc/hosts")).unwrap();
        assert_eq!(json["kind"], "head");
        assert!(json["lines"].is_null());

        let parsed: OperationRequest = serde_json::from_value(serde_json::json!({
            "kind": "grep", "path": "/", "pattern": "x"
        }))
        .unwrap();
        assert_eq!(parsed, OperationRequest::grep("/", "x", false, false));
    }
}
