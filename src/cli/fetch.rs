//! `newsdesk fetch`: load a page through the client cache.

use std::sync::Arc;

use anyhow::{Context, Result};

use newsdesk::client::{self, LoadedPage, ProgressFn, SweepOutcome};
use newsdesk::{clock, Config, Domain, NewsItem};

pub(crate) async fn cmd_fetch(
    mut config: Config,
    page: u32,
    refresh: bool,
    domain: Domain,
    server: Option<String>,
    wait: bool,
) -> Result<()> {
    if let Some(url) = server {
        config.client.server_url = url;
    }
    let progress: ProgressFn = Arc::new(|done, total| {
        eprintln!("  prefetch: {done}/{total} pages");
    });
    let news_client = client::connect(&config.client, &config.upstream, domain, clock::system())
        .context("Failed to create news client")?
        .with_progress(progress);

    let loaded = news_client
        .load(page, refresh)
        .await
        .with_context(|| format!("Failed to load page {page} from {}", config.client.server_url))?;
    print_page(domain, page, &loaded);

    if wait {
        match news_client.wait_for_background().await {
            Some(SweepOutcome::Completed { fetched, failed }) => {
                println!();
                println!("Background sweep: {fetched} fetched, {failed} failed");
            }
            Some(SweepOutcome::AlreadyRunning) | None => {}
        }
    }
    Ok(())
}

fn print_page(domain: Domain, page: u32, loaded: &LoadedPage) {
    let source = if loaded.from_cache { "cache" } else { "origin" };
    println!(
        "{} news, page {}/{} (from {})",
        domain, page, loaded.total_pages, source
    );
    if let Some(ts) = loaded.last_updated {
        println!("Last updated: {}", format_millis(ts));
    }
    println!();
    println!("{:<20} {:<18} {}", "PUBLISHED", "SOURCE", "HEADLINE");
    for item in &loaded.items {
        println!("{}", format_row(item));
    }
}

fn format_row(item: &NewsItem) -> String {
    let published = chrono::DateTime::from_timestamp(item.datetime, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let marker = if item.is_synthetic() { " [archive]" } else { "" };
    format!(
        "{:<20} {:<18} {}{}",
        published,
        truncate(&item.source, 18),
        item.headline,
        marker
    )
}

pub(crate) fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
