//! Client-side page cache with staleness tracking and durable snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::news::{Domain, NewsItem, PageNumber};

use super::storage::DurableStorage;

/// In-memory state of the client cache for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientPageCache {
    pub pages: BTreeMap<PageNumber, Vec<NewsItem>>,
    /// All cached pages flattened in page order.
    pub all_items: Vec<NewsItem>,
    /// Time of the last `update`, Unix milliseconds. 0 when never written.
    pub timestamp: i64,
    pub total_pages: u32,
    /// Origin fetch time reported with the last written page.
    pub last_updated: Option<i64>,
    pub stale_pages: BTreeSet<PageNumber>,
    /// Every page ever written. Survives `reset`.
    pub fetched_pages: BTreeSet<PageNumber>,
    /// Whether the origin flagged its data as served from its own cache.
    pub origin_from_cache: bool,
}

impl ClientPageCache {
    fn rebuild_all_items(&mut self) {
        self.all_items = self.pages.values().flatten().cloned().collect();
    }
}

/// Persisted form of [`ClientPageCache`]; sets are stored as sorted arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CacheSnapshot {
    pages: BTreeMap<PageNumber, Vec<NewsItem>>,
    timestamp: i64,
    total_pages: u32,
    last_updated: Option<i64>,
    pages_fetched: Vec<PageNumber>,
    stale_pages: Vec<PageNumber>,
    origin_from_cache: bool,
}

impl From<&ClientPageCache> for CacheSnapshot {
    fn from(cache: &ClientPageCache) -> Self {
        Self {
            pages: cache.pages.clone(),
            timestamp: cache.timestamp,
            total_pages: cache.total_pages,
            last_updated: cache.last_updated,
            pages_fetched: cache.fetched_pages.iter().copied().collect(),
            stale_pages: cache.stale_pages.iter().copied().collect(),
            origin_from_cache: cache.origin_from_cache,
        }
    }
}

impl From<CacheSnapshot> for ClientPageCache {
    fn from(snapshot: CacheSnapshot) -> Self {
        let mut cache = Self {
            pages: snapshot.pages,
            all_items: Vec::new(),
            timestamp: snapshot.timestamp,
            total_pages: snapshot.total_pages,
            last_updated: snapshot.last_updated,
            stale_pages: snapshot.stale_pages.into_iter().collect(),
            fetched_pages: snapshot.pages_fetched.into_iter().collect(),
            origin_from_cache: snapshot.origin_from_cache,
        };
        // Only pages actually held count as fetched or stale.
        let held: BTreeSet<PageNumber> = cache.pages.keys().copied().collect();
        cache.fetched_pages = held.clone();
        cache.stale_pages.retain(|page| held.contains(page));
        cache.rebuild_all_items();
        cache
    }
}

/// Storage key of a domain's snapshot.
pub fn storage_key(domain: Domain) -> String {
    format!("{domain}_news_cache")
}

/// Thread-safe store over [`ClientPageCache`].
///
/// The lock is never held across an `.await`; every operation is synchronous.
pub struct ClientCacheStore {
    domain: Domain,
    clock: SharedClock,
    storage: Arc<dyn DurableStorage>,
    expiry_ms: i64,
    inner: Mutex<ClientPageCache>,
    /// Generation stamped on each snapshot while the cache lock is held.
    generation: AtomicU64,
    /// Generation of the last snapshot handed to storage. Writes run under
    /// this lock, outside the cache lock.
    written: Mutex<u64>,
}

enum SnapshotWrite {
    Store(String),
    Remove,
}

struct PendingWrite {
    generation: u64,
    write: SnapshotWrite,
}

impl ClientCacheStore {
    pub fn new(
        domain: Domain,
        clock: SharedClock,
        storage: Arc<dyn DurableStorage>,
        expiry_ms: i64,
    ) -> Self {
        Self {
            domain,
            clock,
            storage,
            expiry_ms,
            inner: Mutex::new(ClientPageCache::default()),
            generation: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    fn lock(&self) -> MutexGuard<'_, ClientPageCache> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ClientPageCache {
        self.lock().clone()
    }

    /// Written recently enough and holding at least one page.
    pub fn is_valid(&self) -> bool {
        let cache = self.lock();
        self.is_valid_locked(&cache)
    }

    fn is_valid_locked(&self, cache: &ClientPageCache) -> bool {
        let now = self.clock.now_millis();
        cache.timestamp > 0 && now - cache.timestamp < self.expiry_ms && !cache.pages.is_empty()
    }

    /// Items of `page`, only while the cache is valid.
    pub fn get_page(&self, page: PageNumber) -> Option<Vec<NewsItem>> {
        let cache = self.lock();
        if !self.is_valid_locked(&cache) {
            return None;
        }
        cache.pages.get(&page).cloned()
    }

    /// Items of `page` regardless of age, for degraded serving.
    pub fn peek_page(&self, page: PageNumber) -> Option<Vec<NewsItem>> {
        self.lock().pages.get(&page).cloned()
    }

    pub fn is_page_cached(&self, page: PageNumber) -> bool {
        self.lock().pages.contains_key(&page)
    }

    pub fn is_page_stale(&self, page: PageNumber) -> bool {
        self.lock().stale_pages.contains(&page)
    }

    pub fn cached_pages(&self) -> Vec<PageNumber> {
        self.lock().pages.keys().copied().collect()
    }

    /// Lowest-numbered cached page and its items.
    pub fn first_cached(&self) -> Option<(PageNumber, Vec<NewsItem>)> {
        self.lock()
            .pages
            .iter()
            .next()
            .map(|(page, items)| (*page, items.clone()))
    }

    pub fn total_pages(&self) -> u32 {
        self.lock().total_pages
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.lock().last_updated
    }

    pub fn origin_from_cache(&self) -> bool {
        self.lock().origin_from_cache
    }

    /// Record whether the origin served its last response from its own cache.
    pub fn set_origin_from_cache(&self, from_cache: bool) {
        self.lock().origin_from_cache = from_cache;
    }

    /// Write a freshly fetched page and persist the snapshot.
    pub fn update(
        &self,
        page: PageNumber,
        items: Vec<NewsItem>,
        total_pages: u32,
        last_updated: i64,
    ) {
        let pending = {
            let mut cache = self.lock();
            cache.pages.insert(page, items);
            cache.fetched_pages.insert(page);
            cache.stale_pages.remove(&page);
            cache.timestamp = self.clock.now_millis();
            cache.total_pages = total_pages.max(1);
            cache.last_updated = Some(last_updated);
            cache.rebuild_all_items();
            debug!(domain = %self.domain, page, total_pages = cache.total_pages, "Client cache updated");
            self.prepare_store(&cache)
        };
        self.flush(pending);
    }

    pub fn mark_stale(&self, page: PageNumber) {
        let pending = {
            let mut cache = self.lock();
            cache
                .stale_pages
                .insert(page)
                .then(|| self.prepare_store(&cache))
                .flatten()
        };
        self.flush(pending);
    }

    pub fn clear_stale(&self, page: PageNumber) {
        let pending = {
            let mut cache = self.lock();
            cache
                .stale_pages
                .remove(&page)
                .then(|| self.prepare_store(&cache))
                .flatten()
        };
        self.flush(pending);
    }

    /// Mark every cached page stale. Returns the pages marked.
    pub fn mark_all_stale(&self) -> Vec<PageNumber> {
        let (pages, pending) = {
            let mut cache = self.lock();
            let pages: Vec<PageNumber> = cache.pages.keys().copied().collect();
            cache.stale_pages.extend(pages.iter().copied());
            let pending = if pages.is_empty() {
                None
            } else {
                self.prepare_store(&cache)
            };
            (pages, pending)
        };
        self.flush(pending);
        pages
    }

    /// Hydrate from durable storage. Never fails; returns whether a snapshot
    /// was loaded.
    pub fn load_from_storage(&self) -> bool {
        let key = storage_key(self.domain);
        let raw = match self.storage.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Failed to read client cache, starting empty");
                return false;
            }
        };
        match serde_json::from_str::<CacheSnapshot>(&raw) {
            Ok(snapshot) => {
                let loaded = ClientPageCache::from(snapshot);
                debug!(domain = %self.domain, pages = loaded.pages.len(), "Client cache loaded from storage");
                *self.lock() = loaded;
                true
            }
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Client cache snapshot is corrupt, starting empty");
                false
            }
        }
    }

    /// Drop all pages, their fetch history and the persisted snapshot.
    pub fn reset(&self) {
        let pending = {
            let mut cache = self.lock();
            *cache = ClientPageCache::default();
            self.stamp(SnapshotWrite::Remove)
        };
        self.flush(Some(pending));
    }

    /// Serialize `cache`. Called with the cache lock held so generations
    /// follow the order of the changes.
    fn prepare_store(&self, cache: &ClientPageCache) -> Option<PendingWrite> {
        match serde_json::to_string(&CacheSnapshot::from(cache)) {
            Ok(data) => Some(self.stamp(SnapshotWrite::Store(data))),
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Failed to serialize client cache");
                None
            }
        }
    }

    fn stamp(&self, write: SnapshotWrite) -> PendingWrite {
        PendingWrite {
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            write,
        }
    }

    /// Hand a snapshot to storage unless a newer one already got there.
    fn flush(&self, pending: Option<PendingWrite>) {
        let Some(PendingWrite { generation, write }) = pending else {
            return;
        };
        let mut written = self
            .written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if generation <= *written {
            return;
        }
        *written = generation;
        let key = storage_key(self.domain);
        let result = match write {
            SnapshotWrite::Store(data) => self.storage.set(&key, &data),
            SnapshotWrite::Remove => self.storage.remove(&key),
        };
        if let Err(e) = result {
            warn!(domain = %self.domain, error = %e, "Failed to write client cache snapshot");
        }
    }
}
