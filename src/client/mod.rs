//! Client-side tier: persistent page cache, throttled transport, background
//! prefetch and the fetch-with-cache entry point.

pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use orchestrator::{LoadedPage, NewsClient};
pub use scheduler::{PrefetchScheduler, ProgressFn, SweepOutcome};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use store::{ClientCacheStore, ClientPageCache};
pub use transport::{FetchedPage, HttpPageTransport, PageTransport, ThrottledTransport};

use crate::clock::SharedClock;
use crate::config::{ClientConfig, UpstreamConfig};
use crate::error::Result;
use crate::news::Domain;

/// Open the on-disk client cache for `domain` and hydrate it.
pub fn open_store(config: &ClientConfig, domain: Domain, clock: SharedClock) -> Arc<ClientCacheStore> {
    let storage = Arc::new(FileStorage::new(config.resolved_storage_dir()));
    let store = ClientCacheStore::new(domain, clock, storage, config.cache_expiry_ms);
    store.load_from_storage();
    Arc::new(store)
}

/// Build a [`NewsClient`] talking HTTP to `config.server_url`.
pub fn connect(
    config: &ClientConfig,
    upstream: &UpstreamConfig,
    domain: Domain,
    clock: SharedClock,
) -> Result<NewsClient> {
    let http = HttpPageTransport::new(
        &config.server_url,
        Duration::from_secs(upstream.timeout_secs.max(1)),
    )?;
    let transport = Arc::new(ThrottledTransport::new(Arc::new(http), config.throttle_delay()));
    Ok(NewsClient::new(open_store(config, domain, clock), transport))
}
