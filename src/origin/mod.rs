//! Server-side tier: upstream fetch, TTL cache, padding and pagination.

pub mod assembler;
pub mod cache;
pub mod categorize;
pub mod fetcher;
pub mod padding;

pub use assembler::PaginationAssembler;
pub use cache::{DomainStatus, OriginCache, OriginCacheRecord};
pub use fetcher::{FinnhubSource, NewsSource};
