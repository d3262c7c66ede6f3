//! Detail enrichment stage entry point.

use crate::client::ProjectApi;
use crate::config::Config;
use crate::error::Result;
use crate::models::EnrichOutcome;
use crate::services::DetailEnricher;
use crate::storage::RecordStore;

/// Enrich every discovered project with campaign details.
///
/// In default mode only ids absent from the detail store are fetched; with
/// `rescrape` every id is re-fetched and the store is atomically rewritten.
pub async fn run_details<A: ProjectApi>(
    config: &Config,
    api: &A,
    rescrape: bool,
) -> Result<EnrichOutcome> {
    let discovery = RecordStore::open(config.output.discovery_store_path())?;
    let mut detail_store = RecordStore::open(config.output.detail_store_path())?;

    if discovery.is_empty() {
        log::warn!("Discovery store is empty. Run 'scrape' first.");
        return Ok(EnrichOutcome::default());
    }

    log::info!(
        "Enriching {} projects ({} already detailed{})",
        discovery.len(),
        detail_store.len(),
        if rescrape { ", rescrape" } else { "" }
    );

    let enricher = DetailEnricher::new(api);
    let outcome = enricher.run(&discovery, &mut detail_store, rescrape).await?;

    log::info!(
        "Enrichment done: {} fetched, {} already present, {} failed, {} partial",
        outcome.fetched,
        outcome.skipped_present,
        outcome.skipped_error,
        outcome.partial,
    );

    Ok(outcome)
}
