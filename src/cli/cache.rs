//! `newsdesk cache`: inspect or reset the client cache snapshot.

use anyhow::Result;

use newsdesk::client;
use newsdesk::{clock, Config, Domain};

use super::fetch::format_millis;

fn join_pages(pages: impl IntoIterator<Item = u32>) -> String {
    let list: Vec<String> = pages.into_iter().map(|p| p.to_string()).collect();
    if list.is_empty() {
        "-".to_string()
    } else {
        list.join(", ")
    }
}

pub(crate) fn cmd_cache_status(config: &Config, domain: Domain) -> Result<()> {
    let store = client::open_store(&config.client, domain, clock::system());
    let snapshot = store.snapshot();

    println!("Client cache ({domain})");
    println!(
        "  Location:      {}",
        config.client.resolved_storage_dir().display()
    );
    println!("  Valid:         {}", store.is_valid());
    println!(
        "  Written:       {}",
        if snapshot.timestamp > 0 {
            format_millis(snapshot.timestamp)
        } else {
            "-".to_string()
        }
    );
    println!(
        "  Origin update: {}",
        snapshot.last_updated.map_or_else(|| "-".to_string(), format_millis)
    );
    println!("  Total pages:   {}", snapshot.total_pages);
    println!("  Cached pages:  {}", join_pages(snapshot.pages.keys().copied()));
    println!("  Stale pages:   {}", join_pages(snapshot.stale_pages.iter().copied()));
    println!("  Ever fetched:  {}", join_pages(snapshot.fetched_pages.iter().copied()));
    println!("  Items:         {}", snapshot.all_items.len());
    Ok(())
}

pub(crate) fn cmd_cache_reset(config: &Config, domain: Domain) -> Result<()> {
    let store = client::open_store(&config.client, domain, clock::system());
    let pages = store.cached_pages().len();
    store.reset();
    println!("Cleared {pages} cached page(s) for {domain}");
    Ok(())
}
