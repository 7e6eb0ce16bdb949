//! File browser for one session
//!
//! Combines navigation, the listing cache, operations and uploads. Listings
//! are fetched on a cache miss; operations apply their invalidation set on
//! success so the next listing re-fetches.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use super::cache::RemoteDirectoryCache;
use super::error::FileOpError;
use super::operations::{OperationDispatcher, OperationOutcome, OperationRequest};
use super::path::{normalize, Breadcrumb, PathNavigator};
use super::types::{DirectoryListing, FileEntry};
use super::upload::{BatchSummary, LocalFile, UploadItem, UploadQueueManager};
use crate::config::FileManagerConfig;
use crate::link::RemoteLink;
use crate::session::Session;

pub struct FileBrowser {
    session: Session,
    navigator: PathNavigator,
    link: Arc<dyn RemoteLink>,
    cache: Arc<RemoteDirectoryCache>,
    dispatcher: OperationDispatcher,
    uploads: UploadQueueManager,
}

impl FileBrowser {
    pub fn new(
        session: Session,
        link: Arc<dyn RemoteLink>,
        cache: Arc<RemoteDirectoryCache>,
    ) -> Self {
        Self::with_config(session, link, cache, &FileManagerConfig::default())
    }

    pub fn with_config(
        session: Session,
        link: Arc<dyn RemoteLink>,
        cache: Arc<RemoteDirectoryCache>,
        config: &FileManagerConfig,
    ) -> Self {
        let dispatcher =
            OperationDispatcher::with_defaults(link.clone(), config.operations.clone());
        let uploads =
            UploadQueueManager::with_config(link.clone(), cache.clone(), config.upload.clone());
        Self {
            session,
            navigator: PathNavigator::default(),
            link,
            cache,
            dispatcher,
            uploads,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cwd(&self) -> &str {
        self.navigator.cwd()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.navigator.breadcrumbs()
    }

    pub fn cache(&self) -> &Arc<RemoteDirectoryCache> {
        &self.cache
    }

    pub fn uploads(&self) -> &UploadQueueManager {
        &self.uploads
    }

    // ═══════════════════════════════════════════════════════════════════
    // Navigation
    // ═══════════════════════════════════════════════════════════════════

    pub fn navigate(&mut self, path: &str) -> &str {
        self.navigator.navigate(path)
    }

    pub fn enter(&mut self, child_name: &str) -> &str {
        self.navigator.enter(child_name)
    }

    pub fn up(&mut self) -> &str {
        self.navigator.up()
    }

    pub fn home(&mut self) -> &str {
        self.navigator.home()
    }

    /// Enter a directory entry. Returns false (and stays put) for files.
    pub fn open(&mut self, entry: &FileEntry) -> bool {
        if !entry.is_dir {
            return false;
        }
        self.navigator.enter(&entry.name);
        true
    }

    /// Absolute path of an entry in the current directory
    pub fn path_of(&self, name: &str) -> String {
        self.navigator.child_path(name)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Listings
    // ═══════════════════════════════════════════════════════════════════

    /// Listing of the current directory
    pub async fn listing(&self) -> Result<Arc<DirectoryListing>, FileOpError> {
        self.list(self.navigator.cwd()).await
    }

    /// Listing of `path`, from cache or fetched on a miss
    pub async fn list(&self, path: &str) -> Result<Arc<DirectoryListing>, FileOpError> {
        let path = normalize(path);
        if let Some(listing) = self.cache.get(&self.session.id, &path) {
            return Ok(listing);
        }
        self.fetch(&path).await
    }

    /// Drop the current directory from the cache and fetch it again
    pub async fn refresh(&self) -> Result<Arc<DirectoryListing>, FileOpError> {
        let cwd = self.navigator.cwd();
        self.cache.invalidate(&self.session.id, cwd);
        self.fetch(cwd).await
    }

    async fn fetch(&self, path: &str) -> Result<Arc<DirectoryListing>, FileOpError> {
        debug!("[browser] fetching {}:{}", self.session.id, path);
        let generation = self.cache.generation(&self.session.id);
        let entries = self
            .link
            .list(&self.session.id, path)
            .await
            .map_err(|e| FileOpError::remote("list", e))?;
        Ok(self.cache.put_if_current(
            &self.session.id,
            path,
            generation,
            DirectoryListing::new(path, entries),
        ))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Operations & transfers
    // ═══════════════════════════════════════════════════════════════════

    /// Run an operation and drop the listings it made stale
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> Result<OperationOutcome, FileOpError> {
        let outcome = self.dispatcher.dispatch(&self.session, request).await?;
        self.cache.apply(&self.session.id, &outcome.invalidate);
        Ok(outcome)
    }

    /// Create `name` inside the current directory
    pub async fn mkdir_here(&self, name: &str) -> Result<OperationOutcome, FileOpError> {
        if name.trim().is_empty() {
            return Err(FileOpError::validation("directory name is required"));
        }
        self.execute(OperationRequest::mkdir(self.path_of(name.trim())))
            .await
    }

    pub async fn download(&self, path: &str) -> Result<Bytes, FileOpError> {
        let path = normalize(path);
        self.link
            .download(&self.session.id, &path)
            .await
            .map_err(|e| FileOpError::remote("download", e))
    }

    /// Download `remote_path` and write it to `local_path`
    pub async fn download_to(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<u64, FileOpError> {
        let data = self.download(remote_path).await?;
        tokio::fs::write(local_path.as_ref(), &data).await?;
        info!(
            "[browser] saved {} ({} bytes) to {}",
            remote_path,
            data.len(),
            local_path.as_ref().display()
        );
        Ok(data.len() as u64)
    }

    /// Queue `files` for upload into the current directory
    pub fn select_uploads(&self, files: Vec<LocalFile>) -> Result<Vec<UploadItem>, FileOpError> {
        self.uploads
            .select(&self.session.id, self.navigator.cwd(), files)
    }

    pub async fn run_uploads(&self) -> Result<BatchSummary, FileOpError> {
        self.uploads.run().await
    }

    /// The session reconnected; every cached listing is suspect
    pub fn reconnect(&self) {
        info!("[browser] {} reconnected, dropping cached listings", self.session.id);
        self.cache.invalidate_all(&self.session.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::link::{LinkError, LinkMethod, MemoryLink};

    fn browser() -> (Arc<MemoryLink>, FileBrowser) {
        let link = Arc::new(MemoryLink::new());
        link.add_file("/a/x/inner.txt", "data");
        link.add_dir("/b");
        let cache = Arc::new(RemoteDirectoryCache::new());
        let browser = FileBrowser::new(Session::posix("s"), link.clone(), cache);
        (link, browser)
    }

    #[tokio::test]
    async fn test_listing_fetches_once() {
        let (link, browser) = browser();
        let first = browser.listing().await.unwrap();
        let second = browser.listing().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(link.calls(LinkMethod::List), 1);
        assert_eq!(first.path, "/");
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_navigation_and_open() {
        let (_link, mut browser) = browser();
        let root = browser.listing().await.unwrap();
        let a = root.entry("a").unwrap().clone();

        assert!(browser.open(&a));
        assert_eq!(browser.cwd(), "/a");
        browser.enter("x");
        let listing = browser.listing().await.unwrap();
        let file = listing.entry("inner.txt").unwrap().clone();
        assert!(!browser.open(&file));
        assert_eq!(browser.cwd(), "/a/x");

        assert_eq!(browser.breadcrumbs().len(), 2);
        assert_eq!(browser.up(), "/a");
        assert_eq!(browser.home(), "/");
        assert_eq!(browser.navigate("//b/"), "/b");
    }

    #[tokio::test]
    async fn test_execute_applies_invalidation() {
        let (link, browser) = browser();
        browser.list("/a").await.unwrap();
        browser.list("/b").await.unwrap();
        browser.list("/a/x").await.unwrap();

        browser
            .execute(OperationRequest::move_entry("/a/x", "/b/x"))
            .await
            .unwrap();
        let session = browser.session().id.clone();
        assert!(!browser.cache().contains(&session, "/a"));
        assert!(!browser.cache().contains(&session, "/b"));
        assert!(!browser.cache().contains(&session, "/a/x"));

        let b = browser.list("/b").await.unwrap();
        assert!(b.entry("x").is_some());
        assert_eq!(link.calls(LinkMethod::List), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_in_flight_during_mkdir_is_not_cached() {
        let (link, browser) = browser();
        link.set_list_delay(Duration::from_secs(5));

        let (early, created) = tokio::join!(browser.list("/"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            browser.execute(OperationRequest::mkdir("/new")).await
        });
        created.unwrap();
        assert!(early.unwrap().entry("new").is_none());
        assert!(!browser.cache().contains(&browser.session().id, "/"));

        let root = browser.list("/").await.unwrap();
        assert!(root.entry("new").is_some());
        assert_eq!(link.calls(LinkMethod::List), 2);
    }

    #[tokio::test]
    async fn test_failed_execute_keeps_cache() {
        let (link, browser) = browser();
        browser.list("/a").await.unwrap();
        link.fail_on(LinkMethod::Delete, "/a/x", LinkError::remote("permission denied"));

        assert!(browser
            .execute(OperationRequest::delete("/a/x"))
            .await
            .is_err());
        assert!(browser.cache().contains(&browser.session().id, "/a"));
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let (link, browser) = browser();
        browser.listing().await.unwrap();
        link.add_dir("/c");

        let refreshed = browser.refresh().await.unwrap();
        assert!(refreshed.entry("c").is_some());
        assert_eq!(link.calls(LinkMethod::List), 2);
    }

    #[tokio::test]
    async fn test_mkdir_here_uses_cwd() {
        let (link, mut browser) = browser();
        browser.navigate("/b");
        browser.mkdir_here("logs").await.unwrap();
        assert!(link.is_dir("/b/logs"));
        assert!(browser.mkdir_here("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_drops_everything() {
        let (link, browser) = browser();
        browser.listing().await.unwrap();
        browser.list("/a").await.unwrap();

        browser.reconnect();
        browser.listing().await.unwrap();
        assert_eq!(link.calls(LinkMethod::List), 3);
    }

    #[tokio::test]
    async fn test_download_to_local_file() {
        let (_link, browser) = browser();
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("inner.txt");

        let written = browser.download_to("/a/x/inner.txt", &target).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"data");

        let err = browser.download("/a/missing").await.unwrap_err();
        assert!(matches!(err, FileOpError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_uploads_land_in_cwd_and_refresh_listing() {
        let (link, mut browser) = browser();
        browser.navigate("/b");
        let before = browser.listing().await.unwrap();
        assert!(before.is_empty());

        let items = browser
            .select_uploads(vec![LocalFile::new("implant.log", "hello")])
            .unwrap();
        assert_eq!(items[0].dest_path, "/b/implant.log");
        let summary = browser.run_uploads().await.unwrap();
        assert_eq!(summary.succeeded, 1);

        let after = browser.listing().await.unwrap();
        assert!(after.entry("implant.log").is_some());
        assert_eq!(link.calls(LinkMethod::List), 2);
    }
}
