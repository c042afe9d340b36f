//! Fetch-with-cache: the client's single entry point for reading a page.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::news::{validate_page, Domain, NewsItem, PageNumber};

use super::scheduler::{PrefetchScheduler, ProgressFn, SweepOutcome};
use super::store::ClientCacheStore;
use super::transport::PageTransport;

/// A page as handed to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage {
    pub items: Vec<NewsItem>,
    pub total_pages: u32,
    pub last_updated: Option<i64>,
    pub from_cache: bool,
}

/// Serves pages from the client cache, fetching and prefetching as needed.
pub struct NewsClient {
    store: Arc<ClientCacheStore>,
    transport: Arc<dyn PageTransport>,
    scheduler: Arc<PrefetchScheduler>,
    on_progress: Option<ProgressFn>,
    background: Mutex<Vec<JoinHandle<SweepOutcome>>>,
}

impl NewsClient {
    /// `transport` is shared with the prefetch scheduler; pass a
    /// [`ThrottledTransport`](super::transport::ThrottledTransport) so both
    /// respect the same request spacing.
    pub fn new(store: Arc<ClientCacheStore>, transport: Arc<dyn PageTransport>) -> Self {
        let scheduler = Arc::new(PrefetchScheduler::new(store.clone(), transport.clone()));
        Self {
            store,
            transport,
            scheduler,
            on_progress: None,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Report background sweep progress to `on_progress`.
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn domain(&self) -> Domain {
        self.store.domain()
    }

    pub fn store(&self) -> &Arc<ClientCacheStore> {
        &self.store
    }

    /// Load `page`, from cache when possible.
    ///
    /// With `is_refresh`, every cached page is marked stale and `page` is
    /// fetched from the origin; the rest are revalidated in the background.
    pub async fn load(&self, page: PageNumber, is_refresh: bool) -> Result<LoadedPage> {
        let page = validate_page(page)?;
        let domain = self.domain();

        if !is_refresh {
            if let Some(items) = self.store.get_page(page) {
                debug!(%domain, page, stale = self.store.is_page_stale(page), "Client cache hit");
                if self.store.origin_from_cache() {
                    let marked = self.store.mark_all_stale();
                    debug!(%domain, pages = marked.len(), "Origin data was stale, revalidating in background");
                    self.spawn_sweep(page, true);
                }
                return Ok(self.cached(items));
            }
        } else {
            self.store.mark_all_stale();
        }

        match self.transport.fetch_page(domain, page).await {
            Ok(fetched) => {
                let total_pages = fetched.total_pages.max(1);
                self.store.set_origin_from_cache(fetched.from_cache);
                self.store
                    .update(page, fetched.news.clone(), total_pages, fetched.last_updated);
                self.spawn_sweep(page, is_refresh);
                Ok(LoadedPage {
                    items: fetched.news,
                    total_pages,
                    last_updated: Some(fetched.last_updated),
                    from_cache: false,
                })
            }
            Err(err) => {
                warn!(%domain, page, error = %err, "Page fetch failed");
                let fallback = self
                    .store
                    .peek_page(page)
                    .or_else(|| self.store.first_cached().map(|(_, items)| items));
                match fallback {
                    Some(items) => Ok(self.cached(items)),
                    None => Err(err),
                }
            }
        }
    }

    fn cached(&self, items: Vec<NewsItem>) -> LoadedPage {
        LoadedPage {
            items,
            total_pages: self.store.total_pages().max(1),
            last_updated: self.store.last_updated(),
            from_cache: true,
        }
    }

    fn spawn_sweep(&self, start_page: PageNumber, is_refresh: bool) {
        let scheduler = self.scheduler.clone();
        let on_progress = self.on_progress.clone();
        let handle =
            tokio::spawn(async move { scheduler.run(start_page, on_progress, is_refresh).await });
        let mut handles = self
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait for the background sweeps still tracked. A sweep that already
    /// finished when a later one was spawned is no longer tracked.
    ///
    /// Completed sweeps are summed. A sweep that found another one running
    /// handed its work to it, so it only counts when nothing else completed.
    pub async fn wait_for_background(&self) -> Option<SweepOutcome> {
        let handles = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let mut result = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Background sweep task failed");
                    continue;
                }
            };
            result = Some(match (result, outcome) {
                (
                    Some(SweepOutcome::Completed { fetched, failed }),
                    SweepOutcome::Completed {
                        fetched: more,
                        failed: more_failed,
                    },
                ) => SweepOutcome::Completed {
                    fetched: fetched + more,
                    failed: failed + more_failed,
                },
                (Some(done @ SweepOutcome::Completed { .. }), SweepOutcome::AlreadyRunning) => done,
                (_, outcome) => outcome,
            });
        }
        result
    }
}
