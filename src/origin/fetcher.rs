//! Upstream news provider client.
//!
//! [`NewsSource`] is the seam the origin cache talks to. [`FinnhubSource`]
//! is the production implementation: one `GET /news?category=general` per
//! fetch, followed by the per-domain keyword filter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::{NewsError, Result};
use crate::news::{Domain, NewsItem};

/// Keywords that mark a story as belonging to the domestic market.
///
/// The domestic feed keeps stories matching any of these; the global feed
/// drops them.
const DOMESTIC_KEYWORDS: &[&str] = &[
    "india",
    "indian",
    "nse",
    "bse",
    "sensex",
    "nifty",
    "rbi",
    "reserve bank of india",
    "mumbai",
    "rupee",
    "inr",
    "sebi",
    "fii",
    "dii",
    "reliance",
    "tcs",
    "hdfc",
    "icici",
    "infosys",
    "adani",
    "tata",
    "bharti",
    "bajaj",
    "mahindra",
    "maruti",
    "wipro",
];

/// The global feed only excludes the market-level keywords, not company names.
const GLOBAL_EXCLUDE_KEYWORDS: &[&str] = &[
    "india",
    "indian",
    "nse",
    "bse",
    "sensex",
    "nifty",
    "rbi",
    "reserve bank of india",
    "mumbai",
    "rupee",
    "inr",
    "sebi",
];

/// Upstream categories accepted when broadening a thin domestic feed.
const BROADENING_CATEGORIES: &[&str] = &["general", "business"];

/// Produces the live item set for a domain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch, filter and tag the current items for `domain`.
    async fn fetch(&self, domain: Domain) -> Result<Vec<NewsItem>>;
}

/// Article as returned by the upstream provider. Missing and `null` fields
/// both read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamArticle {
    pub id: Value,
    #[serde(deserialize_with = "null_as_default")]
    pub headline: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub datetime: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub related: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl UpstreamArticle {
    fn mentions_any(&self, keywords: &[&str]) -> bool {
        let headline = self.headline.to_lowercase();
        let summary = self.summary.to_lowercase();
        let related = self.related.to_lowercase();
        keywords
            .iter()
            .any(|kw| headline.contains(kw) || summary.contains(kw) || related.contains(kw))
    }

    fn into_item(self, category: &str) -> NewsItem {
        let id = match self.id {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => format!("{}-{}", self.datetime, self.url),
        };
        NewsItem {
            id,
            headline: self.headline,
            summary: self.summary,
            datetime: self.datetime,
            source: self.source,
            url: self.url,
            category: category.to_string(),
            related: self.related,
            image: self.image,
            is_fallback: false,
            is_historical: false,
        }
    }
}

/// Apply the domain's inclusion/exclusion rule and tag every item with the
/// domain's fixed category.
pub fn filter_for_domain(
    domain: Domain,
    articles: Vec<UpstreamArticle>,
    domestic_min_items: usize,
) -> Vec<NewsItem> {
    let tag = domain.as_str();
    match domain {
        Domain::Global => articles
            .into_iter()
            .filter(|a| !a.mentions_any(GLOBAL_EXCLUDE_KEYWORDS))
            .map(|a| a.into_item(tag))
            .collect(),
        Domain::Domestic => {
            let (matching, rest): (Vec<_>, Vec<_>) = articles
                .into_iter()
                .partition(|a| a.mentions_any(DOMESTIC_KEYWORDS));
            let shortfall = domestic_min_items.saturating_sub(matching.len());
            let broadening = rest
                .into_iter()
                .filter(|a| BROADENING_CATEGORIES.contains(&a.category.to_lowercase().as_str()))
                .take(shortfall);
            matching
                .into_iter()
                .chain(broadening)
                .map(|a| a.into_item(tag))
                .collect()
        }
    }
}

/// Finnhub-compatible REST news source.
pub struct FinnhubSource {
    client: Client,
    base_url: String,
    api_key: String,
    domestic_min_items: usize,
}

impl std::fmt::Debug for FinnhubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubSource")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FinnhubSource {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| NewsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            domestic_min_items: config.domestic_min_items,
        })
    }

    fn news_url(&self) -> String {
        format!("{}/news", self.base_url)
    }
}

#[async_trait]
impl NewsSource for FinnhubSource {
    async fn fetch(&self, domain: Domain) -> Result<Vec<NewsItem>> {
        debug!(%domain, "Fetching upstream news");

        let mut request = self
            .client
            .get(self.news_url())
            .query(&[("category", "general"), ("minId", "10")]);
        if !self.api_key.is_empty() {
            request = request.query(&[("token", self.api_key.as_str())]);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("");
            return Err(NewsError::from_upstream(
                status.as_u16(),
                format!("upstream error: {} {} {}", status.as_u16(), reason, body.trim()),
            ));
        }

        let articles: Vec<UpstreamArticle> = response.json().await.map_err(|e| {
            NewsError::UpstreamUnavailable {
                status: 0,
                message: format!("failed to parse upstream response: {e}"),
            }
        })?;
        let fetched = articles.len();
        let items = filter_for_domain(domain, articles, self.domestic_min_items);
        debug!(%domain, fetched, kept = items.len(), "Upstream news filtered");
        Ok(items)
    }
}
