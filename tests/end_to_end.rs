//! Origin server and client cache wired together over real HTTP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use newsdesk::api::config::ServerConfig;
use newsdesk::api::{serve, AppState};
use newsdesk::client::{
    ClientCacheStore, HttpPageTransport, MemoryStorage, NewsClient, PageTransport, SweepOutcome,
    ThrottledTransport,
};
use newsdesk::clock::{self, ManualClock};
use newsdesk::config::OriginConfig;
use newsdesk::origin::{NewsSource, OriginCache};
use newsdesk::{Domain, NewsError, NewsItem, MAX_PAGES, PAGE_SIZE};

const NOW: i64 = 1_760_000_000_000;

struct FakeSource {
    items: Vec<NewsItem>,
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl NewsSource for FakeSource {
    async fn fetch(&self, _domain: Domain) -> newsdesk::Result<Vec<NewsItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(NewsError::from_upstream(503, "maintenance"))
        } else {
            Ok(self.items.clone())
        }
    }
}

fn item(i: usize) -> NewsItem {
    NewsItem {
        id: format!("live-{i}"),
        headline: format!("Markets move {i}"),
        summary: String::new(),
        datetime: NOW / 1000 - i as i64 * 60,
        source: "Wire".into(),
        url: format!("https://news.example/{i}"),
        category: "general".into(),
        related: String::new(),
        image: String::new(),
        is_fallback: false,
        is_historical: false,
    }
}

struct Harness {
    url: String,
    source: Arc<FakeSource>,
    state: AppState,
}

async fn start(source: FakeSource) -> Harness {
    let source = Arc::new(source);
    let cache = OriginCache::new(source.clone(), ManualClock::new(NOW), OriginConfig::default());
    let state = AppState::new(Arc::new(cache));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server_state = state.clone();
    tokio::spawn(async move {
        let config = ServerConfig::default();
        serve(listener, server_state, &config).await
    });
    Harness { url, source, state }
}

fn client_for(url: &str, delay: Duration) -> NewsClient {
    let http = HttpPageTransport::new(url, Duration::from_secs(5)).unwrap();
    let transport: Arc<dyn PageTransport> =
        Arc::new(ThrottledTransport::new(Arc::new(http), delay));
    let store = Arc::new(ClientCacheStore::new(
        Domain::Global,
        clock::system(),
        Arc::new(MemoryStorage::new()),
        3 * 60 * 60 * 1000,
    ));
    NewsClient::new(store, transport)
}

#[tokio::test]
async fn test_client_loads_and_prefetches_all_pages() {
    let harness = start(FakeSource {
        items: (0..12).map(item).collect(),
        calls: AtomicUsize::new(0),
        fail: false,
    })
    .await;
    let client = client_for(&harness.url, Duration::from_millis(20));

    let first = client.load(1, false).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.items.len(), PAGE_SIZE);
    assert_eq!(first.total_pages, MAX_PAGES);
    assert_eq!(first.items[0].id, "live-0");

    assert_eq!(
        client.wait_for_background().await,
        Some(SweepOutcome::Completed {
            fetched: 3,
            failed: 0
        })
    );
    assert_eq!(client.store().cached_pages(), vec![1, 2, 3, 4]);

    // Page 2 holds the last two live items followed by padding.
    let second = client.load(2, false).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.items[1].id, "live-11");
    assert!(second.items[2].is_historical);

    // One upstream call served every page.
    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 1);
    harness.state.shutdown.cancel();
}

#[tokio::test]
async fn test_upstream_outage_still_serves_padded_pages() {
    let harness = start(FakeSource {
        items: Vec::new(),
        calls: AtomicUsize::new(0),
        fail: true,
    })
    .await;
    let client = client_for(&harness.url, Duration::ZERO);

    let loaded = client.load(3, false).await.unwrap();
    assert_eq!(loaded.items.len(), PAGE_SIZE);
    assert!(loaded.items.iter().all(|i| i.is_historical && i.is_fallback));
    client.wait_for_background().await;
    harness.state.shutdown.cancel();
}

#[tokio::test]
async fn test_refresh_revalidates_through_the_server() {
    let harness = start(FakeSource {
        items: (0..3).map(item).collect(),
        calls: AtomicUsize::new(0),
        fail: false,
    })
    .await;
    let client = client_for(&harness.url, Duration::ZERO);
    client.load(1, false).await.unwrap();
    client.wait_for_background().await;

    let refreshed = client.load(2, true).await.unwrap();
    assert!(!refreshed.from_cache);
    client.wait_for_background().await;
    assert!((1..=MAX_PAGES).all(|p| !client.store().is_page_stale(p)));
    harness.state.shutdown.cancel();
}

#[tokio::test]
async fn test_client_survives_server_going_away() {
    let harness = start(FakeSource {
        items: (0..3).map(item).collect(),
        calls: AtomicUsize::new(0),
        fail: false,
    })
    .await;
    let client = client_for(&harness.url, Duration::ZERO);
    let first = client.load(1, false).await.unwrap();
    client.wait_for_background().await;

    harness.state.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A refresh cannot reach the server, so the cached page is served.
    let fallback = client.load(1, true).await.unwrap();
    assert!(fallback.from_cache);
    assert_eq!(fallback.items, first.items);
}
