//! Directory listing cache
//!
//! Last-fetched listings keyed by (session, normalized path). Each session's
//! entries sit behind their own lock so invalidation of a set of keys is atomic
//! with respect to concurrent puts from the same session.
//!
//! Every invalidation bumps the session's generation. A fetch records the
//! generation before it goes to the remote and stores its result with
//! [`RemoteDirectoryCache::put_if_current`], so a listing read before a
//! mutation landed never outlives that mutation's invalidation.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::path::{is_within, normalize, parent};
use super::types::DirectoryListing;
use crate::config::CacheConfig;
use crate::session::SessionId;

/// Cache keys an operation makes stale
///
/// `exact` keys are dropped as-is; every key within a `subtrees` path is
/// dropped too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationSet {
    pub exact: BTreeSet<String>,
    pub subtrees: BTreeSet<String>,
}

impl InvalidationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The containing directory of `path` changed
    pub fn touch(&mut self, path: &str) -> &mut Self {
        self.exact.insert(parent(path));
        self
    }

    /// The listing of `path` itself is stale
    pub fn drop_path(&mut self, path: &str) -> &mut Self {
        self.exact.insert(normalize(path));
        self
    }

    /// `path` and everything cached below it is stale
    pub fn drop_subtree(&mut self, path: &str) -> &mut Self {
        self.subtrees.insert(normalize(path));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.subtrees.is_empty()
    }

    /// Whether applying this set would drop `path`
    pub fn covers(&self, path: &str) -> bool {
        let path = normalize(path);
        self.exact.contains(&path) || self.subtrees.iter().any(|root| is_within(&path, root))
    }

    pub fn merge(&mut self, other: InvalidationSet) {
        self.exact.extend(other.exact);
        self.subtrees.extend(other.subtrees);
    }
}

/// Hit/miss/invalidation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

struct CachedListing {
    listing: Arc<DirectoryListing>,
    fetched_at: Instant,
}

#[derive(Default)]
struct SessionEntries {
    listings: HashMap<String, CachedListing>,
    generation: u64,
}

pub struct RemoteDirectoryCache {
    sessions: DashMap<SessionId, Mutex<SessionEntries>>,
    max_age: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl RemoteDirectoryCache {
    pub fn new() -> Self {
        Self::with_max_age(None)
    }

    /// Entries older than `max_age` read as misses
    pub fn with_max_age(max_age: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            max_age,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_max_age(config.max_age())
    }

    pub fn get(&self, session: &SessionId, path: &str) -> Option<Arc<DirectoryListing>> {
        let key = normalize(path);
        let found = self.sessions.get(session).and_then(|entries| {
            let entries = entries.lock();
            entries
                .listings
                .get(&key)
                .filter(|cached| self.is_fresh(cached))
                .map(|cached| cached.listing.clone())
        });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("[cache] hit {} {}", session, key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("[cache] miss {} {}", session, key);
        }
        found
    }

    fn is_fresh(&self, cached: &CachedListing) -> bool {
        match self.max_age {
            Some(max_age) => cached.fetched_at.elapsed() <= max_age,
            None => true,
        }
    }

    /// Store a fresh listing, replacing whatever was cached for that path
    pub fn put(
        &self,
        session: &SessionId,
        path: &str,
        listing: DirectoryListing,
    ) -> Arc<DirectoryListing> {
        let listing = Arc::new(listing);
        let entries = self.sessions.entry(session.clone()).or_default();
        entries.lock().listings.insert(
            normalize(path),
            CachedListing {
                listing: listing.clone(),
                fetched_at: Instant::now(),
            },
        );
        listing
    }

    /// Current invalidation generation of a session
    pub fn generation(&self, session: &SessionId) -> u64 {
        self.sessions
            .get(session)
            .map(|entries| entries.lock().generation)
            .unwrap_or(0)
    }

    /// Store a listing fetched at `generation`
    ///
    /// The listing is discarded if any invalidation ran for the session since
    /// `generation` was read. The caller still gets it back either way.
    pub fn put_if_current(
        &self,
        session: &SessionId,
        path: &str,
        generation: u64,
        listing: DirectoryListing,
    ) -> Arc<DirectoryListing> {
        let listing = Arc::new(listing);
        let key = normalize(path);
        let entries = self.sessions.entry(session.clone()).or_default();
        let mut entries = entries.lock();
        if entries.generation != generation {
            debug!(
                "[cache] discarding {} {} fetched at generation {} (now {})",
                session, key, generation, entries.generation
            );
            return listing;
        }
        entries.listings.insert(
            key,
            CachedListing {
                listing: listing.clone(),
                fetched_at: Instant::now(),
            },
        );
        listing
    }

    /// Whether a listing is cached, without touching the counters or the max age
    pub fn contains(&self, session: &SessionId, path: &str) -> bool {
        self.sessions
            .get(session)
            .map(|entries| entries.lock().listings.contains_key(&normalize(path)))
            .unwrap_or(false)
    }

    /// Drop `path` and its parent
    pub fn invalidate(&self, session: &SessionId, path: &str) {
        let mut set = InvalidationSet::new();
        set.drop_path(path).touch(path);
        self.apply(session, &set);
    }

    /// Drop `path` and every cached key within it
    pub fn invalidate_subtree(&self, session: &SessionId, path: &str) {
        let mut set = InvalidationSet::new();
        set.drop_subtree(path);
        self.apply(session, &set);
    }

    /// Drop every key covered by `set` in one critical section
    pub fn apply(&self, session: &SessionId, set: &InvalidationSet) {
        if set.is_empty() {
            return;
        }
        self.invalidations.fetch_add(1, Ordering::Relaxed);

        let entries = self.sessions.entry(session.clone()).or_default();
        let mut entries = entries.lock();
        entries.generation += 1;
        let before = entries.listings.len();
        entries.listings.retain(|key, _| !set.covers(key));
        debug!(
            "[cache] {} invalidated {} listing(s)",
            session,
            before - entries.listings.len()
        );
    }

    /// Forget everything cached for a session
    ///
    /// The session keeps its generation so fetches already in flight are
    /// discarded too.
    pub fn invalidate_all(&self, session: &SessionId) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let entries = self.sessions.entry(session.clone()).or_default();
        let mut entries = entries.lock();
        entries.generation += 1;
        if !entries.listings.is_empty() {
            entries.listings.clear();
            debug!("[cache] dropped all listings for {}", session);
        }
    }

    /// Cached paths for a session, sorted
    pub fn cached_paths(&self, session: &SessionId) -> Vec<String> {
        let mut paths: Vec<String> = self
            .sessions
            .get(session)
            .map(|entries| entries.lock().listings.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for RemoteDirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: &str) -> SessionId {
        SessionId::from(id)
    }

    fn listing(path: &str) -> DirectoryListing {
        DirectoryListing::new(path, Vec::new())
    }

    fn seed(cache: &RemoteDirectoryCache, session: &SessionId, paths: &[&str]) {
        for path in paths {
            cache.put(session, path, listing(path));
        }
    }

    #[test]
    fn test_get_normalizes_key() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        cache.put(&s, "/etc/", listing("/etc"));

        assert!(cache.get(&s, "//etc").is_some());
        assert!(cache.get(&s, "/var").is_none());
        assert!(cache.get(&sid("other"), "/etc").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_put_replaces_wholesale() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        let first = cache.put(&s, "/", listing("/"));
        let second = cache.put(&s, "/", listing("/"));

        let current = cache.get(&s, "/").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[test]
    fn test_invalidate_drops_path_and_parent() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        seed(&cache, &s, &["/", "/a", "/a/b", "/a/b/c"]);

        cache.invalidate(&s, "/a/b");
        assert_eq!(cache.cached_paths(&s), vec!["/", "/a/b/c"]);
    }

    #[test]
    fn test_invalidate_subtree_is_segment_aware() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        seed(&cache, &s, &["/a", "/a/x", "/a/x/y", "/a/xy"]);

        cache.invalidate_subtree(&s, "/a/x");
        assert_eq!(cache.cached_paths(&s), vec!["/a", "/a/xy"]);
    }

    #[test]
    fn test_apply_set_and_counts_once() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        seed(&cache, &s, &["/", "/a", "/a/x", "/b", "/c"]);

        let mut set = InvalidationSet::new();
        set.touch("/a/x").touch("/b/x").drop_subtree("/a/x");
        cache.apply(&s, &set);

        assert_eq!(cache.cached_paths(&s), vec!["/", "/c"]);
        assert_eq!(cache.stats().invalidations, 1);

        cache.apply(&s, &InvalidationSet::new());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_invalidate_all_is_per_session() {
        let cache = RemoteDirectoryCache::new();
        seed(&cache, &sid("a"), &["/", "/a"]);
        seed(&cache, &sid("b"), &["/"]);

        cache.invalidate_all(&sid("a"));
        assert!(cache.cached_paths(&sid("a")).is_empty());
        assert!(cache.contains(&sid("b"), "/"));
    }

    #[test]
    fn test_fetch_started_before_invalidation_is_discarded() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        let before = cache.generation(&s);

        let mut set = InvalidationSet::new();
        set.touch("/new");
        cache.apply(&s, &set);

        let returned = cache.put_if_current(&s, "/", before, listing("/"));
        assert_eq!(returned.path, "/");
        assert!(!cache.contains(&s, "/"));

        let current = cache.generation(&s);
        cache.put_if_current(&s, "/", current, listing("/"));
        assert!(cache.contains(&s, "/"));
    }

    #[test]
    fn test_generation_survives_invalidate_all() {
        let cache = RemoteDirectoryCache::new();
        let s = sid("a");
        seed(&cache, &s, &["/"]);
        let before = cache.generation(&s);

        cache.invalidate_all(&s);
        assert!(cache.generation(&s) > before);
        cache.put_if_current(&s, "/", before, listing("/"));
        assert!(cache.cached_paths(&s).is_empty());

        // Empty sets are not invalidations
        let current = cache.generation(&s);
        cache.apply(&s, &InvalidationSet::new());
        assert_eq!(cache.generation(&s), current);
    }

    #[test]
    fn test_covers_root_subtree() {
        let mut set = InvalidationSet::new();
        set.drop_subtree("/");
        assert!(set.covers("/anything/at/all"));
        assert!(!InvalidationSet::new().covers("/"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_age_expires_entries() {
        let cache = RemoteDirectoryCache::with_max_age(Some(Duration::from_secs(30)));
        let s = sid("a");
        cache.put(&s, "/", listing("/"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get(&s, "/").is_some());

        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(cache.get(&s, "/").is_none());
        assert!(cache.contains(&s, "/"));
    }
}
