//! End-to-end scenarios through the public API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remote_files::config::{TimeoutConfig, UploadConfig};
use remote_files::files::{
    path, BatchOutcome, InvalidationSet, LocalFile, OperationOutput, UploadEvent,
    UploadState,
};
use remote_files::link::protocol::{ListResult, PathParams};
use remote_files::link::{LinkMethod, MemoryLink, RpcLink, RpcTransport, TimeoutLink};
use remote_files::{
    FileBrowser, FileManagerConfig, FileOpError, LinkError, OperationDispatcher,
    OperationRequest, RemoteDirectoryCache, RemoteLink, Session, SessionId,
    UploadQueueManager,
};
use tokio::sync::mpsc;

fn session() -> Session {
    Session::posix("implant-1")
}

#[test]
fn path_rules() {
    assert_eq!(path::normalize("//a//b/"), "/a/b");
    assert_eq!(path::normalize("/"), "/");
    assert_eq!(path::up("/a/b"), "/a");
    assert_eq!(path::up("/"), "/");
    assert_eq!(path::enter("/", "etc"), "/etc");
    assert_eq!(path::enter("/etc", "ssh"), "/etc/ssh");
}

#[tokio::test]
async fn move_invalidates_both_parents_and_next_list_refetches() {
    let link = Arc::new(MemoryLink::new());
    link.add_dir("/a/x");
    link.add_dir("/b");
    let cache = Arc::new(RemoteDirectoryCache::new());
    let browser = FileBrowser::new(session(), link.clone(), cache.clone());

    browser.list("/a").await.unwrap();
    browser.list("/b").await.unwrap();
    assert_eq!(link.calls(LinkMethod::List), 2);

    browser
        .execute(OperationRequest::move_entry("/a/x", "/b/x"))
        .await
        .unwrap();

    let a = browser.list("/a").await.unwrap();
    let b = browser.list("/b").await.unwrap();
    assert!(a.entry("x").is_none());
    assert!(b.entry("x").is_some());
    assert_eq!(link.calls(LinkMethod::List), 4);
}

#[tokio::test(start_paused = true)]
async fn upload_batch_with_one_failure() {
    let link = Arc::new(MemoryLink::new());
    link.add_dir("/remote/dir");
    link.fail_on(
        LinkMethod::Upload,
        "/remote/dir/b.txt",
        LinkError::remote("permission denied"),
    );
    let cache = Arc::new(RemoteDirectoryCache::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let uploads = UploadQueueManager::new(link.clone(), cache.clone()).with_events(tx);
    let sid = SessionId::from("implant-1");

    let files = vec![
        LocalFile::new("a.txt", "alpha"),
        LocalFile::new("b.txt", "bravo"),
        LocalFile::new("c.txt", "charlie"),
    ];
    uploads.select(&sid, "/remote/dir", files).unwrap();
    let summary = uploads.run().await.unwrap();

    assert_eq!((summary.succeeded, summary.failed), (2, 1));
    assert_eq!(summary.outcome(), BatchOutcome::PartialFailure);
    assert!(matches!(
        summary.into_result(),
        Err(FileOpError::PartialBatchFailure { succeeded: 2, failed: 1 })
    ));

    let items = uploads.items();
    assert_eq!(items[0].state, UploadState::Done);
    assert!(matches!(items[1].state, UploadState::Error { .. }));
    assert_eq!(items[2].state, UploadState::Done);
    assert_eq!(items[0].state.progress(), 100);
    assert_eq!(items.iter().filter(|i| i.state.is_terminal()).count(), 3);
    assert_eq!(cache.stats().invalidations, 1);

    // Every item's progress only grows
    let mut last = std::collections::HashMap::new();
    while let Ok(event) = rx.try_recv() {
        if let UploadEvent::StateChanged { id, state } = event {
            let previous = last.insert(id, state.progress()).unwrap_or(0);
            assert!(state.progress() >= previous);
        }
    }
}

#[tokio::test]
async fn grep_two_files_in_order() {
    let link = Arc::new(MemoryLink::new());
    link.add_file("/var/log/app.log", "start\nERROR disk full\n");
    link.add_file("/var/log/nginx/error.log", "error lowercase\nERROR upstream\n");
    let ops = OperationDispatcher::new(link.clone());

    let outcome = ops
        .dispatch(
            &session(),
            OperationRequest::grep("/var/log", "ERROR", true, false),
        )
        .await
        .unwrap();

    let OperationOutput::Matches(matches) = &outcome.output else {
        panic!("expected matches, got {:?}", outcome.output);
    };
    assert_eq!(matches.len(), 2);
    assert_eq!(
        (matches[0].path.as_str(), matches[0].line_number),
        ("/var/log/app.log", 2)
    );
    assert_eq!(
        (matches[1].path.as_str(), matches[1].line_number),
        ("/var/log/nginx/error.log", 2)
    );
    assert_eq!(outcome.invalidate, InvalidationSet::new());
}

#[tokio::test]
async fn chmod_permission_denied_keeps_cache() {
    let link = Arc::new(MemoryLink::new());
    link.add_file("/tmp/f", "x");
    link.fail_on(
        LinkMethod::Chmod,
        "/tmp/f",
        LinkError::remote("permission denied"),
    );
    let cache = Arc::new(RemoteDirectoryCache::new());
    let browser = FileBrowser::new(session(), link.clone(), cache.clone());
    browser.list("/tmp").await.unwrap();

    let err = browser
        .execute(OperationRequest::chmod("/tmp/f", "644", false))
        .await
        .unwrap_err();
    assert!(matches!(err, FileOpError::Remote { .. }));
    assert!(cache.contains(&session().id, "/tmp"));
    assert_eq!(cache.stats().invalidations, 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_surfaces_as_remote_error() {
    let memory = MemoryLink::new();
    memory.add_dir("/remote");
    memory.set_upload_delay(Duration::from_secs(3600));
    let link: Arc<dyn RemoteLink> = Arc::new(TimeoutLink::new(memory, TimeoutConfig::default()));
    let cache = Arc::new(RemoteDirectoryCache::new());
    let uploads = UploadQueueManager::with_config(
        link,
        cache,
        UploadConfig {
            tick_interval_ms: 1000,
            ..UploadConfig::default()
        },
    );

    let sid = SessionId::from("slow");
    uploads
        .select(&sid, "/remote", vec![LocalFile::new("big.iso", "...")])
        .unwrap();
    let summary = uploads.run().await.unwrap();
    assert_eq!(summary.outcome(), BatchOutcome::AllFailed);
    assert!(matches!(
        summary.into_result(),
        Err(FileOpError::BatchFailed { failed: 1 })
    ));

    match &uploads.items()[0].state {
        UploadState::Error { progress, message } => {
            assert_eq!(*progress, 90);
            assert!(message.contains("300s"));
        }
        other => panic!("unexpected state {:?}", other),
    }
}

/// Agent stand-in answering `ls` from a [`MemoryLink`]
struct LoopbackTransport {
    fs: MemoryLink,
}

#[async_trait]
impl RpcTransport for LoopbackTransport {
    async fn call(
        &self,
        session: &SessionId,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LinkError> {
        match method {
            "ls" => {
                let params: PathParams = serde_json::from_value(params)?;
                let files = self.fs.list(session, &params.path).await?;
                Ok(serde_json::to_value(ListResult {
                    files,
                    path: Some(params.path),
                })?)
            }
            "mkdir" => {
                let params: PathParams = serde_json::from_value(params)?;
                self.fs.mkdir(session, &params.path).await?;
                Ok(serde_json::json!({ "success": true }))
            }
            other => Err(LinkError::Protocol(format!("unsupported method {}", other))),
        }
    }
}

#[tokio::test]
async fn browser_over_rpc_link() {
    let fs = MemoryLink::new();
    fs.add_file("/home/op/notes.md", "# notes");
    let link = Arc::new(RpcLink::new(LoopbackTransport { fs }));
    let cache = Arc::new(RemoteDirectoryCache::new());
    let mut browser =
        FileBrowser::with_config(session(), link, cache, &FileManagerConfig::default());

    browser.navigate("/home/op");
    let listing = browser.listing().await.unwrap();
    let notes = listing.entry("notes.md").unwrap();
    assert_eq!(notes.size, 7);
    assert!(!notes.is_dir);

    browser.mkdir_here("loot").await.unwrap();
    let listing = browser.listing().await.unwrap();
    assert!(listing.entry("loot").map(|e| e.is_dir).unwrap_or(false));

    let err = browser
        .execute(OperationRequest::head("/home/op/notes.md"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.link_error(),
        Some(LinkError::Protocol(_))
    ));
}
