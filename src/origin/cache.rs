//! Origin cache: one TTL'd record per news domain in front of the upstream provider.
//!
//! Each domain has an async refresh lock held for the whole check-and-refresh
//! sequence, so concurrent requests for the same domain issue at most one
//! upstream call and never overwrite each other's results. The record itself
//! sits behind a short-lived sync lock, so status reads and ingest never wait
//! for an upstream fetch.
//! Rate-limit errors and, when any data exists, other upstream errors are
//! absorbed: the last good items keep being served.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::OriginConfig;
use crate::error::Result;
use crate::events::{EventBus, NewsEvent};
use crate::news::{Domain, NewsItem};

use super::categorize::{categorize, taxonomy, CategoryId};
use super::fetcher::NewsSource;

/// Cached state for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginCacheRecord {
    /// Last good upstream item set. `None` until the first successful fetch.
    pub items: Option<Vec<NewsItem>>,
    /// When `items` was fetched, in Unix milliseconds. 0 before the first fetch.
    pub fetched_at_millis: i64,
    pub buckets: BTreeMap<CategoryId, Vec<NewsItem>>,
    pub rate_limited: bool,
    pub rate_limited_since: Option<i64>,
    pub last_error: Option<String>,
    /// Items pushed by the streaming producer, newest first.
    pub streamed: Vec<NewsItem>,
}

impl OriginCacheRecord {
    /// Returns `true` when a successful fetch has populated `items`.
    pub fn has_data(&self) -> bool {
        self.items.is_some()
    }

    /// Returns `true` when nothing at all can be served from this record.
    pub fn is_empty(&self) -> bool {
        self.items.as_ref().map_or(true, Vec::is_empty) && self.streamed.is_empty()
    }

    /// Streamed items followed by upstream items, de-duplicated by id.
    pub fn live_items(&self) -> Vec<NewsItem> {
        let mut seen = HashSet::new();
        self.streamed
            .iter()
            .chain(self.items.iter().flatten())
            .filter(|item| seen.insert(item.id.clone()))
            .cloned()
            .collect()
    }

    /// Clear an expired rate-limit flag. Returns `true` if it was cleared.
    fn clear_expired_rate_limit(&mut self, now: i64, reset_window_ms: i64) -> bool {
        match self.rate_limited_since {
            Some(since) if self.rate_limited && now - since > reset_window_ms => {
                self.rate_limited = false;
                self.rate_limited_since = None;
                self.last_error = None;
                true
            }
            _ => false,
        }
    }

    fn should_refresh(&self, now: i64, ttl_ms: i64) -> bool {
        self.items.is_none() || (now - self.fetched_at_millis > ttl_ms && !self.rate_limited)
    }

    fn apply_success(&mut self, domain: Domain, items: Vec<NewsItem>, now: i64) {
        self.buckets = categorize(taxonomy(domain), &items);
        self.items = Some(items);
        self.fetched_at_millis = now;
        self.rate_limited = false;
        self.rate_limited_since = None;
        self.last_error = None;
    }
}

/// Non-refreshing view of a domain record, for health and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub has_data: bool,
    pub items: usize,
    pub streamed: usize,
    pub fetched_at: i64,
    pub rate_limited: bool,
    pub rate_limited_since: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct DomainSlot {
    refresh: tokio::sync::Mutex<()>,
    record: Mutex<OriginCacheRecord>,
}

/// Per-domain origin cache wrapping a [`NewsSource`].
pub struct OriginCache {
    source: Arc<dyn NewsSource>,
    clock: SharedClock,
    config: OriginConfig,
    slots: HashMap<Domain, DomainSlot>,
    events: EventBus,
}

impl OriginCache {
    pub fn new(source: Arc<dyn NewsSource>, clock: SharedClock, config: OriginConfig) -> Self {
        let slots = Domain::ALL
            .into_iter()
            .map(|d| (d, DomainSlot::default()))
            .collect();
        Self {
            source,
            clock,
            config,
            slots,
            events: EventBus::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn slot(&self, domain: Domain) -> &DomainSlot {
        // Every domain is inserted in `new`.
        &self.slots[&domain]
    }

    fn record(&self, domain: Domain) -> MutexGuard<'_, OriginCacheRecord> {
        self.slot(domain)
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the domain's record, refreshing it from upstream first if due.
    ///
    /// Fails only when the upstream fetch fails with a non-rate-limit error
    /// and there is no data of any kind to serve instead.
    pub async fn get_or_refresh(&self, domain: Domain) -> Result<OriginCacheRecord> {
        let _refresh = self.slot(domain).refresh.lock().await;
        let now = self.clock.now_millis();

        {
            let mut record = self.record(domain);
            if record.clear_expired_rate_limit(now, self.config.rate_limit_reset_ms) {
                info!(%domain, "Rate-limit window elapsed, upstream fetches re-enabled");
            }
            if !record.should_refresh(now, self.config.cache_duration_ms) {
                debug!(%domain, age_ms = now - record.fetched_at_millis, "Serving cached origin record");
                return Ok(record.clone());
            }
        }

        let fetched = self.source.fetch(domain).await;
        let mut record = self.record(domain);
        match fetched {
            Ok(items) => {
                let count = items.len();
                record.apply_success(domain, items, now);
                info!(%domain, items = count, "Origin cache refreshed");
                self.events.send(NewsEvent::Refreshed {
                    domain,
                    items: count,
                });
            }
            Err(err) if err.is_rate_limited() => {
                warn!(%domain, error = %err, "Upstream rate limit reached, serving cached data");
                record.rate_limited = true;
                record.rate_limited_since = Some(now);
                record.last_error = Some(err.to_string());
                self.events.send(NewsEvent::RateLimited {
                    domain,
                    message: err.to_string(),
                });
            }
            Err(err) => {
                record.last_error = Some(err.to_string());
                if record.is_empty() {
                    warn!(%domain, error = %err, "Upstream fetch failed with nothing cached");
                    return Err(err);
                }
                warn!(%domain, error = %err, "Upstream fetch failed, serving stale data");
                self.events.send(NewsEvent::Degraded {
                    domain,
                    error: err.to_string(),
                });
            }
        }

        Ok(record.clone())
    }

    /// Merge items from the streaming producer ahead of the next read.
    ///
    /// Incoming items go first; an id already present is replaced by the
    /// incoming copy. The list is capped at `streamed_items_cap`. Returns the
    /// number of distinct incoming items.
    pub fn ingest(&self, domain: Domain, items: Vec<NewsItem>) -> usize {
        let mut record = self.record(domain);
        let mut seen = HashSet::new();
        let incoming: Vec<NewsItem> = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        let accepted = incoming.len();

        let previous = std::mem::take(&mut record.streamed);
        record.streamed = incoming
            .into_iter()
            .chain(previous.into_iter().filter(|item| !seen.contains(&item.id)))
            .take(self.config.streamed_items_cap)
            .collect();

        debug!(%domain, accepted, held = record.streamed.len(), "Streamed items ingested");
        self.events.send(NewsEvent::Ingested { domain, accepted });
        accepted
    }

    /// Concatenate the named category buckets in order and keep the first `limit`.
    pub async fn section(
        &self,
        domain: Domain,
        categories: &[CategoryId],
        limit: usize,
    ) -> Result<Vec<NewsItem>> {
        let record = self.get_or_refresh(domain).await?;
        Ok(categories
            .iter()
            .filter_map(|c| record.buckets.get(c))
            .flatten()
            .take(limit)
            .cloned()
            .collect())
    }

    /// Flags of the domain record without triggering a refresh.
    pub fn status(&self, domain: Domain) -> DomainStatus {
        let record = self.record(domain);
        DomainStatus {
            has_data: record.has_data(),
            items: record.items.as_ref().map_or(0, Vec::len),
            streamed: record.streamed.len(),
            fetched_at: record.fetched_at_millis,
            rate_limited: record.rate_limited,
            rate_limited_since: record.rate_limited_since,
            last_error: record.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::NewsError;
    use crate::news::sample_item;
    use crate::origin::fetcher::MockNewsSource;
    use crate::origin::testing::ScriptedSource;
    use std::time::Duration;

    const START: i64 = 1_760_000_000_000;

    fn items(n: usize) -> Vec<NewsItem> {
        (0..n)
            .map(|i| sample_item(&i.to_string(), 1_760_000_000 - i as i64))
            .collect()
    }

    fn cache_with(source: Arc<dyn NewsSource>, clock: Arc<ManualClock>) -> OriginCache {
        OriginCache::new(source, clock, OriginConfig::default())
    }

    fn rate_limit() -> NewsError {
        NewsError::from_upstream(429, "upstream error: 429 Too Many Requests")
    }

    #[tokio::test]
    async fn test_two_calls_within_ttl_fetch_once() {
        let mut source = MockNewsSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(items(3)));
        let clock = ManualClock::new(START);
        let cache = cache_with(Arc::new(source), clock.clone());

        let first = cache.get_or_refresh(Domain::Global).await.unwrap();
        clock.advance(59 * 60 * 1000);
        let second = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(first.items, second.items);
        assert_eq!(second.fetched_at_millis, START);
    }

    #[tokio::test]
    async fn test_concurrent_calls_fetch_once() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(items(5))]).with_delay(Duration::from_millis(50)),
        );
        let cache = Arc::new(cache_with(source.clone(), ManualClock::new(START)));

        let (a, b) = tokio::join!(
            cache.get_or_refresh(Domain::Global),
            cache.get_or_refresh(Domain::Global)
        );
        assert_eq!(a.unwrap().items.unwrap().len(), 5);
        assert_eq!(b.unwrap().items.unwrap().len(), 5);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_status_and_ingest_do_not_wait_for_refresh() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(items(3))]).with_delay(Duration::from_millis(200)),
        );
        let cache = Arc::new(cache_with(source.clone(), ManualClock::new(START)));
        let refresh = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_refresh(Domain::Global).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        assert!(!cache.status(Domain::Global).has_data);
        assert_eq!(cache.ingest(Domain::Global, vec![sample_item("pushed", 1)]), 1);
        assert!(started.elapsed() < Duration::from_millis(100));

        // The item pushed mid-refresh survives the refresh.
        let record = refresh.await.unwrap().unwrap();
        assert_eq!(record.streamed.len(), 1);
        assert_eq!(record.items.unwrap().len(), 3);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_ttl() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(items(2)), Ok(items(4))]));
        let clock = ManualClock::new(START);
        let cache = cache_with(source.clone(), clock.clone());

        cache.get_or_refresh(Domain::Global).await.unwrap();
        clock.advance(60 * 60 * 1000 + 1);
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(record.items.unwrap().len(), 4);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(items(1))]));
        let cache = cache_with(source.clone(), ManualClock::new(START));
        cache.get_or_refresh(Domain::Global).await.unwrap();
        cache.get_or_refresh(Domain::Domestic).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_stale_items() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(items(3)), Err(rate_limit())]));
        let clock = ManualClock::new(START);
        let cache = cache_with(source.clone(), clock.clone());

        cache.get_or_refresh(Domain::Global).await.unwrap();
        clock.advance(60 * 60 * 1000 + 1);
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();

        assert!(record.rate_limited);
        assert_eq!(record.rate_limited_since, Some(START + 60 * 60 * 1000 + 1));
        assert!(record.last_error.is_some());
        assert_eq!(record.items.unwrap().len(), 3);

        // Still rate limited: a stale record is not refetched.
        clock.advance(60 * 60 * 1000 + 1);
        cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_recovers_after_window() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(items(3)),
            Err(rate_limit()),
            Ok(items(6)),
        ]));
        let clock = ManualClock::new(START);
        let cache = cache_with(source.clone(), clock.clone());

        cache.get_or_refresh(Domain::Global).await.unwrap();
        clock.advance(60 * 60 * 1000 + 1);
        let limited = cache.get_or_refresh(Domain::Global).await.unwrap();
        let since = limited.rate_limited_since.unwrap();

        clock.set(since + 24 * 60 * 60 * 1000 + 1);
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert!(!record.rate_limited);
        assert!(record.rate_limited_since.is_none());
        assert!(record.last_error.is_none());
        assert_eq!(record.items.unwrap().len(), 6);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_without_data_is_soft() {
        let source = Arc::new(ScriptedSource::new(vec![Err(rate_limit())]));
        let cache = cache_with(source, ManualClock::new(START));
        let record = cache.get_or_refresh(Domain::Domestic).await.unwrap();
        assert!(record.rate_limited);
        assert!(record.items.is_none());
    }

    #[tokio::test]
    async fn test_hard_error_without_data_propagates() {
        let err = NewsError::from_upstream(500, "boom");
        let source = Arc::new(ScriptedSource::new(vec![Err(err.clone())]));
        let cache = cache_with(source, ManualClock::new(START));
        assert_eq!(cache.get_or_refresh(Domain::Global).await, Err(err));
        let status = cache.status(Domain::Global);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_hard_error_with_data_is_soft() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(items(2)),
            Err(NewsError::from_upstream(503, "down")),
        ]));
        let clock = ManualClock::new(START);
        let cache = cache_with(source, clock.clone());
        let mut events = cache.events().subscribe();

        cache.get_or_refresh(Domain::Global).await.unwrap();
        clock.advance(60 * 60 * 1000 + 1);
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(record.items.unwrap().len(), 2);
        assert!(!record.rate_limited);
        assert!(record.last_error.unwrap().contains("down"));

        assert!(matches!(events.recv().await.unwrap(), NewsEvent::Refreshed { .. }));
        assert!(matches!(events.recv().await.unwrap(), NewsEvent::Degraded { .. }));
    }

    #[tokio::test]
    async fn test_hard_error_with_only_streamed_items_is_soft() {
        let source = Arc::new(ScriptedSource::new(vec![Err(NewsError::from_upstream(
            500, "boom",
        ))]));
        let cache = cache_with(source, ManualClock::new(START));
        cache.ingest(Domain::Global, items(1));
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(record.live_items().len(), 1);
    }

    #[tokio::test]
    async fn test_buckets_recomputed_on_refresh() {
        let mut a = sample_item("a", 10);
        a.headline = "Inflation cools".into();
        let mut b = sample_item("b", 9);
        b.headline = "Stocks drift".into();
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![a, b])]));
        let cache = cache_with(source, ManualClock::new(START));
        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(record.buckets["economic"].len(), 1);
        assert_eq!(record.buckets["global"].len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_dedupes_and_caps() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![])]));
        let cache = cache_with(source, ManualClock::new(START));

        let first = cache.ingest(Domain::Global, items(40));
        assert_eq!(first, 40);

        let mut updated = sample_item("0", 1_760_000_500);
        updated.headline = "Updated".into();
        let mut batch = vec![updated.clone(), updated];
        batch.extend((100..120).map(|i| sample_item(&i.to_string(), 1_760_000_100)));
        let accepted = cache.ingest(Domain::Global, batch);
        assert_eq!(accepted, 21);

        let record = cache.get_or_refresh(Domain::Global).await.unwrap();
        assert_eq!(record.streamed.len(), 50);
        assert_eq!(record.streamed[0].headline, "Updated");
        assert_eq!(record.streamed.iter().filter(|i| i.id == "0").count(), 1);
    }

    #[tokio::test]
    async fn test_live_items_prefers_streamed_copy() {
        let mut record = OriginCacheRecord {
            items: Some(vec![sample_item("1", 5), sample_item("2", 4)]),
            ..Default::default()
        };
        let mut streamed = sample_item("2", 6);
        streamed.headline = "Streamed".into();
        record.streamed = vec![streamed];
        let live = record.live_items();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].headline, "Streamed");
    }

    #[tokio::test]
    async fn test_section_concatenates_buckets() {
        let mut a = sample_item("a", 10);
        a.headline = "GDP grows".into();
        let mut b = sample_item("b", 9);
        b.headline = "Tax bill passes".into();
        let mut c = sample_item("c", 8);
        c.headline = "Merger talks".into();
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![a, b, c])]));
        let cache = cache_with(source, ManualClock::new(START));
        let section = cache
            .section(Domain::Global, &["policy", "economic"], 5)
            .await
            .unwrap();
        let ids: Vec<_> = section.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_status_does_not_refresh() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(items(1))]));
        let cache = cache_with(source.clone(), ManualClock::new(START));
        let status = cache.status(Domain::Global);
        assert!(!status.has_data);
        assert_eq!(source.calls(), 0);
    }
}
