//! Export stage entry point.

use crate::config::Config;
use crate::error::Result;
use crate::models::{ExportOutcome, Project, ProjectDetail};
use crate::relevance::RelevanceScorer;
use crate::storage::export::{build_rows, write_arrow, write_csv};
use crate::storage::RecordStore;

/// Merge the discovery and detail stores and write CSV + Arrow exports.
///
/// Purely local: reads both stores, recomputes derived columns, and writes
/// both files from the same row set. Running it twice on unchanged stores
/// produces byte-identical output.
pub fn run_export(config: &Config) -> Result<ExportOutcome> {
    let discovery = RecordStore::open(config.output.discovery_store_path())?;
    let details = RecordStore::open(config.output.detail_store_path())?;

    let projects: Vec<Project> = discovery.load_all()?;
    let detail_records: Vec<ProjectDetail> = details.load_all()?;

    if projects.is_empty() {
        log::warn!("Discovery store is empty, nothing to export.");
        return Ok(ExportOutcome::default());
    }

    let scorer = RelevanceScorer::from_config(&config.relevance)?;
    let rows = build_rows(&projects, &detail_records, &scorer)?;
    let with_detail = rows.iter().filter(|r| r.campaign_story_text.is_some()).count();

    write_csv(&rows, config.output.csv_path())?;
    write_arrow(&rows, config.output.arrow_path())?;

    log::info!(
        "Export done: {} rows ({} with details)",
        rows.len(),
        with_detail
    );

    Ok(ExportOutcome {
        rows: rows.len(),
        with_detail,
    })
}
