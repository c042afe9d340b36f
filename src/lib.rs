//! newsdesk: a two-tier market news cache.
//!
//! The origin tier ([`origin`], served by [`api`]) sits in front of a
//! rate-limited upstream news provider. It keeps one TTL'd record per news
//! domain, backs off when rate limited, categorizes items and pads every
//! domain to a fixed number of pages with deterministic archive items.
//!
//! The client tier ([`client`]) caches pages locally with staleness
//! tracking, spaces its requests through a throttled transport and
//! prefetches the remaining pages in the background.

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod news;
pub mod origin;

pub use config::Config;
pub use error::{NewsError, Result};
pub use news::{Domain, NewsItem, PageResponse, Pagination, MAX_PAGES, PAGE_SIZE};
