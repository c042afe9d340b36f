//! News item model, domains and the fixed paging constants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NewsError;

/// Number of pages the paginated API always reports.
pub const MAX_PAGES: u32 = 4;

/// Default number of items on one page.
pub const PAGE_SIZE: usize = 10;

/// Page number in `1..=MAX_PAGES`.
pub type PageNumber = u32;

/// Validate a requested page number.
pub fn validate_page(page: u32) -> crate::error::Result<PageNumber> {
    if (1..=MAX_PAGES).contains(&page) {
        Ok(page)
    } else {
        Err(NewsError::InvalidPageNumber(page))
    }
}

/// A single news article, either live from upstream or synthetic padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    /// Publication time in Unix seconds.
    pub datetime: i64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub related: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fallback: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_historical: bool,
}

impl NewsItem {
    /// Lowercased `headline + " " + summary`, the text categorization matches on.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.headline, self.summary).to_lowercase()
    }

    /// Returns `true` for padding produced by the historical generator.
    pub fn is_synthetic(&self) -> bool {
        self.is_fallback || self.is_historical
    }
}

/// Which feed a cache record serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// World markets, with domestic-market stories filtered out.
    #[default]
    Global,
    /// The home market feed.
    Domestic,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Global, Domain::Domestic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Global => "global",
            Domain::Domestic => "domestic",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = NewsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(Domain::Global),
            "domestic" => Ok(Domain::Domestic),
            other => Err(NewsError::UnknownDomain(other.to_string())),
        }
    }
}

/// Pagination block of the paginated API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub page: u32,
    pub page_size: usize,
    pub total_pages: u32,
}

/// Body of `GET /news`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub news: Vec<NewsItem>,
    pub pagination: Pagination,
    /// Origin fetch time in Unix milliseconds.
    pub last_updated: i64,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
pub(crate) fn sample_item(id: &str, datetime: i64) -> NewsItem {
    NewsItem {
        id: id.to_string(),
        headline: format!("Headline {id}"),
        summary: String::new(),
        datetime,
        source: "Wire".into(),
        url: format!("https://news.example/{id}"),
        category: "general".into(),
        related: String::new(),
        image: String::new(),
        is_fallback: false,
        is_historical: false,
    }
}
