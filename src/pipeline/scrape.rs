//! Discovery stage entry point.

use crate::client::ProjectApi;
use crate::config::Config;
use crate::error::Result;
use crate::models::DiscoveryOutcome;
use crate::relevance::RelevanceScorer;
use crate::services::DiscoveryCrawler;
use crate::storage::RecordStore;

/// Run the discovery crawler over every configured query pair, appending new
/// relevant projects to the discovery store.
pub async fn run_scrape<A: ProjectApi>(config: &Config, api: &A) -> Result<DiscoveryOutcome> {
    let mut store = RecordStore::open(config.output.discovery_store_path())?;
    log::info!(
        "Discovery store: {} ({} known projects)",
        store.path().display(),
        store.len()
    );

    let scorer = RelevanceScorer::from_config(&config.relevance)?;
    let crawler = DiscoveryCrawler::new(api, &scorer, config);
    let outcome = crawler.run(&mut store).await?;

    log::info!(
        "Discovery done: {} pages, {} seen, {} added, {} duplicate, {} irrelevant, {} filtered by state",
        outcome.pages,
        outcome.seen,
        outcome.added,
        outcome.duplicate,
        outcome.irrelevant,
        outcome.filtered_state,
    );
    if outcome.failed_pairs > 0 {
        log::warn!("{} query pairs abandoned after retries", outcome.failed_pairs);
    }

    Ok(outcome)
}
