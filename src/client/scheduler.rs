//! Background prefetch of every page into the client cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::news::{PageNumber, MAX_PAGES};

use super::store::ClientCacheStore;
use super::transport::PageTransport;

/// Progress callback: `(pages_done, total_pages)`.
pub type ProgressFn = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Result of a [`PrefetchScheduler::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// A sweep ran to the end. Per-page failures are counted, not raised.
    Completed { fetched: usize, failed: usize },
    /// Another sweep was already in flight; nothing was done.
    AlreadyRunning,
}

/// Clears the running flag when the sweep ends, including on unwind.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequentially fetches every page that is missing or awaiting revalidation.
pub struct PrefetchScheduler {
    store: Arc<ClientCacheStore>,
    transport: Arc<dyn PageTransport>,
    running: AtomicBool,
    refresh_requested: AtomicBool,
}

impl PrefetchScheduler {
    pub fn new(store: Arc<ClientCacheStore>, transport: Arc<dyn PageTransport>) -> Self {
        Self {
            store,
            transport,
            running: AtomicBool::new(false),
            refresh_requested: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn needs_fetch(&self, page: PageNumber, is_refresh: bool) -> bool {
        !self.store.is_page_cached(page) || (is_refresh && self.store.is_page_stale(page))
    }

    /// Fetch `start_page` first, then pages `1..=total_pages` in order.
    ///
    /// A refresh that arrives while another sweep is in flight returns
    /// [`SweepOutcome::AlreadyRunning`]; the running sweep then makes one
    /// more refresh pass before it releases the flag.
    pub async fn run(
        &self,
        start_page: PageNumber,
        on_progress: Option<ProgressFn>,
        is_refresh: bool,
    ) -> SweepOutcome {
        if is_refresh {
            self.refresh_requested.store(true, Ordering::Release);
        }
        let report = |done: u32, total: u32| {
            if let Some(cb) = &on_progress {
                cb(done, total);
            }
        };
        let mut totals: Option<(usize, usize)> = None;

        while self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let guard = RunningGuard(&self.running);
            loop {
                let refresh = self.refresh_requested.swap(false, Ordering::AcqRel);
                let (fetched, failed) = self.sweep(start_page, &report, refresh).await;
                let (f, x) = totals.unwrap_or((0, 0));
                totals = Some((f + fetched, x + failed));
                if !self.refresh_requested.load(Ordering::Acquire) {
                    break;
                }
            }
            drop(guard);
            // A refresh may have been requested between the last check and the release.
            if !self.refresh_requested.load(Ordering::Acquire) {
                break;
            }
        }

        match totals {
            Some((fetched, failed)) => SweepOutcome::Completed { fetched, failed },
            None => {
                debug!(is_refresh, "Prefetch sweep already running");
                SweepOutcome::AlreadyRunning
            }
        }
    }

    /// One pass over the start page and then every page. Returns
    /// `(fetched, failed)`.
    async fn sweep(
        &self,
        start_page: PageNumber,
        report: &(dyn Fn(u32, u32) + Sync),
        is_refresh: bool,
    ) -> (usize, usize) {
        let domain = self.store.domain();
        let mut fetched = 0;
        let mut failed = 0;

        if self.needs_fetch(start_page, is_refresh) {
            match self.fetch_into_store(start_page).await {
                Ok(total) => {
                    fetched += 1;
                    report(start_page.saturating_sub(1), total);
                }
                Err(e) => {
                    failed += 1;
                    warn!(%domain, page = start_page, error = %e, "Failed to fetch initial page");
                    report(0, MAX_PAGES);
                }
            }
        }

        let total_pages = match self.store.total_pages() {
            0 => MAX_PAGES,
            n => n,
        };

        for page in 1..=total_pages {
            if !self.needs_fetch(page, is_refresh) {
                report(page - 1, total_pages);
                continue;
            }
            match self.fetch_into_store(page).await {
                Ok(total) => {
                    fetched += 1;
                    report(page - 1, total);
                }
                Err(e) => {
                    failed += 1;
                    warn!(%domain, page, error = %e, "Failed to prefetch page");
                }
            }
        }

        info!(%domain, fetched, failed, is_refresh, "Prefetch sweep finished");
        (fetched, failed)
    }

    /// Fetch one page and write it through the store. Returns the page count
    /// the origin reported.
    async fn fetch_into_store(&self, page: PageNumber) -> crate::error::Result<u32> {
        let result = self.transport.fetch_page(self.store.domain(), page).await?;
        let total = result.total_pages.max(1);
        self.store.set_origin_from_cache(result.from_cache);
        self.store
            .update(page, result.news, total, result.last_updated);
        Ok(total)
    }
}
