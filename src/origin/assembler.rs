//! Pagination over the origin cache with historical padding.
//!
//! The read API always reports [`MAX_PAGES`] pages and every page always
//! holds exactly `page_size` items; missing live items are replaced by
//! deterministic archive items from [`padding`](super::padding).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::news::{validate_page, Domain, NewsItem, PageNumber, PageResponse, Pagination, MAX_PAGES};

use super::cache::{OriginCache, OriginCacheRecord};
use super::categorize::CategoryId;
use super::padding;

/// Default number of items returned for a section view.
pub const SECTION_LIMIT: usize = 5;

/// Category buckets that make up a named section, in priority order.
pub fn section_categories(domain: Domain, name: &str) -> Option<&'static [CategoryId]> {
    match (domain, name) {
        (Domain::Domestic, "market-beats") => Some(&["market-updates", "economic", "fii-dii"]),
        (Domain::Global, "market-beats") => Some(&["economic", "corporate", "policy"]),
        _ => None,
    }
}

/// Body of `GET /news/poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub news: Option<Vec<NewsItem>>,
    pub last_updated: i64,
    pub has_updates: bool,
    pub from_cache: bool,
    pub error: Option<String>,
}

/// Full current item set of a domain, as pushed to streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub news: Vec<NewsItem>,
    pub last_updated: i64,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Slices origin cache contents into fixed-size pages.
#[derive(Clone)]
pub struct PaginationAssembler {
    cache: Arc<OriginCache>,
    page_size: usize,
}

impl PaginationAssembler {
    pub fn new(cache: Arc<OriginCache>) -> Self {
        let page_size = cache.config().page_size.max(1);
        Self { cache, page_size }
    }

    pub fn cache(&self) -> &Arc<OriginCache> {
        &self.cache
    }

    /// Serve `page` of `domain`.
    ///
    /// `limit == 1` returns only the most recent item. Any other limit is
    /// served as a full page of `page_size` items.
    pub async fn get_page(
        &self,
        domain: Domain,
        page: PageNumber,
        limit: usize,
    ) -> Result<PageResponse> {
        let page = validate_page(page)?;
        let now = self.cache.now_millis();

        match self.cache.get_or_refresh(domain).await {
            Ok(record) => {
                let ttl = self.cache.config().cache_duration_ms;
                // A record that never fetched (e.g. rate limited on the first
                // call) is served like the hard-error case.
                let (last_updated, from_cache) = if record.has_data() {
                    (record.fetched_at_millis, now - record.fetched_at_millis > ttl)
                } else {
                    (now, false)
                };
                let error = informational_error(&record);
                let response = assemble_page(
                    record.live_items(),
                    page,
                    limit,
                    self.page_size,
                    now,
                    last_updated,
                    from_cache,
                    error,
                );
                debug!(%domain, page, items = response.news.len(), from_cache, "Page assembled");
                Ok(response)
            }
            Err(err) => {
                warn!(%domain, page, error = %err, "No origin data, serving historical padding");
                Ok(assemble_page(
                    Vec::new(),
                    page,
                    limit,
                    self.page_size,
                    now,
                    now,
                    false,
                    Some(err.to_string()),
                ))
            }
        }
    }

    /// Named section view (e.g. `market-beats`), or `None` for an unknown name.
    pub async fn get_section(
        &self,
        domain: Domain,
        name: &str,
        limit: usize,
    ) -> Result<Option<FeedSnapshot>> {
        let Some(categories) = section_categories(domain, name) else {
            return Ok(None);
        };
        let news = self.cache.section(domain, categories, limit).await?;
        let status = self.cache.status(domain);
        let now = self.cache.now_millis();
        Ok(Some(FeedSnapshot {
            news,
            last_updated: status.fetched_at,
            from_cache: now - status.fetched_at > self.cache.config().cache_duration_ms,
            error: None,
        }))
    }

    /// Everything currently held for `domain`, without padding.
    pub async fn snapshot(&self, domain: Domain) -> FeedSnapshot {
        let now = self.cache.now_millis();
        match self.cache.get_or_refresh(domain).await {
            Ok(record) => FeedSnapshot {
                news: sorted_newest_first(record.live_items()),
                last_updated: record.fetched_at_millis,
                from_cache: now - record.fetched_at_millis > self.cache.config().cache_duration_ms,
                error: informational_error(&record),
            },
            Err(err) => FeedSnapshot {
                news: Vec::new(),
                last_updated: 0,
                from_cache: true,
                error: Some(err.to_string()),
            },
        }
    }

    /// Conditional read: items are included only when the origin fetched
    /// something newer than `last_timestamp`. Always reported as cached.
    pub async fn poll(&self, domain: Domain, last_timestamp: Option<i64>) -> PollResponse {
        let snapshot = self.snapshot(domain).await;
        let has_updates = last_timestamp.map_or(true, |last| last < snapshot.last_updated);
        PollResponse {
            news: has_updates.then_some(snapshot.news),
            last_updated: snapshot.last_updated,
            has_updates,
            from_cache: true,
            error: snapshot.error,
        }
    }
}

/// Only pure-padding pages carry the upstream error; soft failures on top of
/// live data stay internal.
fn informational_error(record: &OriginCacheRecord) -> Option<String> {
    if record.is_empty() {
        record.last_error.clone()
    } else {
        None
    }
}

fn sorted_newest_first(mut items: Vec<NewsItem>) -> Vec<NewsItem> {
    // `sort_by` is stable: equal datetimes keep their input order.
    items.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    items
}

/// Pad, sort and slice `live` into one page.
#[allow(clippy::too_many_arguments)]
pub fn assemble_page(
    live: Vec<NewsItem>,
    page: PageNumber,
    limit: usize,
    page_size: usize,
    now_millis: i64,
    last_updated: i64,
    from_cache: bool,
    error: Option<String>,
) -> PageResponse {
    let required = MAX_PAGES as usize * page_size;
    let padding_count = required.saturating_sub(live.len());

    let mut combined = live;
    combined.extend(padding::generate(padding_count, now_millis));
    let combined = sorted_newest_first(combined);

    if limit == 1 {
        if let Some(first) = combined.first() {
            return PageResponse {
                news: vec![first.clone()],
                pagination: Pagination {
                    total: combined.len(),
                    page: 1,
                    page_size: 1,
                    total_pages: MAX_PAGES,
                },
                last_updated,
                from_cache,
                error,
            };
        }
    }

    let start = (page as usize - 1) * page_size;
    let end = (start + page_size).min(combined.len());
    let mut news: Vec<NewsItem> = combined.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
    if news.len() < page_size {
        news.extend(padding::generate_from(
            padding_count,
            page_size - news.len(),
            now_millis,
        ));
    }

    PageResponse {
        news,
        pagination: Pagination {
            total: combined.len().max(required),
            page,
            page_size,
            total_pages: MAX_PAGES,
        },
        last_updated,
        from_cache,
        error,
    }
}
