//! Page transport: how the client reaches the paginated read API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{NewsError, Result};
use crate::news::{Domain, NewsItem, PageNumber, Pagination};

/// One page as returned by the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub news: Vec<NewsItem>,
    pub total_pages: u32,
    pub last_updated: i64,
    /// Origin served this page from data older than its TTL.
    pub from_cache: bool,
}

/// Fetches a single page from the origin.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch_page(&self, domain: Domain, page: PageNumber) -> Result<FetchedPage>;
}

/// Lenient view of the `GET /news` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WirePage {
    news: Option<Vec<NewsItem>>,
    pagination: Option<Pagination>,
    last_updated: i64,
    from_cache: bool,
    error: Option<String>,
}

impl WirePage {
    fn into_fetched(self) -> Result<FetchedPage> {
        let news = match (self.news, self.error) {
            (Some(news), _) => news,
            (None, Some(error)) => return Err(NewsError::Transport(error)),
            (None, None) => return Err(NewsError::Transport("response has no news".into())),
        };
        Ok(FetchedPage {
            news,
            total_pages: self.pagination.map_or(1, |p| p.total_pages.max(1)),
            last_updated: self.last_updated,
            from_cache: self.from_cache,
        })
    }
}

/// Talks to a running origin server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPageTransport {
    client: Client,
    server_url: String,
}

impl HttpPageTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NewsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    fn news_url(&self) -> String {
        format!("{}/news", self.server_url)
    }
}

#[async_trait]
impl PageTransport for HttpPageTransport {
    async fn fetch_page(&self, domain: Domain, page: PageNumber) -> Result<FetchedPage> {
        let page_param = page.to_string();
        let response = self
            .client
            .get(self.news_url())
            .query(&[("page", page_param.as_str()), ("domain", domain.as_str())])
            .send()
            .await
            .map_err(|e| NewsError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Transport(format!(
                "error fetching news: {}",
                status.as_u16()
            )));
        }

        let body: WirePage = response
            .json()
            .await
            .map_err(|e| NewsError::Transport(format!("invalid news response: {e}")))?;
        body.into_fetched()
    }
}

/// Spaces calls to the inner transport at least `delay` apart.
///
/// The slot is reserved under a lock, so concurrent callers queue up rather
/// than all firing once the previous delay has elapsed.
pub struct ThrottledTransport {
    inner: Arc<dyn PageTransport>,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ThrottledTransport {
    pub fn new(inner: Arc<dyn PageTransport>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            last_request: Mutex::new(None),
        }
    }

    async fn reserve_slot(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let wait = self.delay.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "Throttling page request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl PageTransport for ThrottledTransport {
    async fn fetch_page(&self, domain: Domain, page: PageNumber) -> Result<FetchedPage> {
        self.reserve_slot().await;
        self.inner.fetch_page(domain, page).await
    }
}
