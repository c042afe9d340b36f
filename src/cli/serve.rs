//! `newsdesk serve`: run the origin cache behind the paginated news API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newsdesk::api::{start_server, AppState};
use newsdesk::clock;
use newsdesk::origin::{FinnhubSource, OriginCache};
use newsdesk::Config;

pub(crate) async fn cmd_serve(
    config: Config,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(b) = bind {
        server_config.bind = b;
    }
    if let Some(p) = port {
        server_config.port = p;
    }

    if config.upstream.api_key.is_empty() {
        warn!("No upstream API key configured; set NEWSDESK_UPSTREAM_API_KEY or FINNHUB_API_KEY");
    }
    let source = FinnhubSource::from_config(&config.upstream)
        .context("Failed to create upstream news source")?;
    let cache = OriginCache::new(Arc::new(source), clock::system(), config.origin.clone());
    let state = AppState::new(Arc::new(cache));

    tokio::spawn(cancel_on_signal(state.shutdown.clone()));

    println!("News API:       http://{}", server_config.addr());
    println!(
        "Origin TTL:     {} min",
        config.origin.cache_duration_ms / 60_000
    );
    start_server(&server_config, state)
        .await
        .with_context(|| format!("Failed to serve on {}", server_config.addr()))?;
    info!("News API server stopped");
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
    token.cancel();
}
