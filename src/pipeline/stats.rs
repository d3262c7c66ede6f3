//! Store summary without network access.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Result;
use crate::models::Project;
use crate::storage::RecordStore;

/// Snapshot of what the local stores currently hold.
#[derive(Debug, Default, PartialEq)]
pub struct StatsReport {
    pub discovered: usize,
    pub detailed: usize,
    /// Discovery record count per project state, sorted by state name
    pub states: BTreeMap<String, usize>,
}

impl StatsReport {
    pub fn pending_details(&self) -> usize {
        self.discovered.saturating_sub(self.detailed)
    }
}

/// Summarize both stores and log the breakdown.
pub fn run_stats(config: &Config) -> Result<StatsReport> {
    let discovery = RecordStore::open(config.output.discovery_store_path())?;
    let details = RecordStore::open(config.output.detail_store_path())?;

    let mut states: BTreeMap<String, usize> = BTreeMap::new();
    for project in discovery.iter::<Project>()? {
        *states.entry(project.state.as_str().to_string()).or_default() += 1;
    }

    let report = StatsReport {
        discovered: discovery.len(),
        detailed: details.len(),
        states,
    };

    log::info!(
        "Discovered: {} projects ({})",
        report.discovered,
        discovery.path().display()
    );
    log::info!(
        "Detailed:   {} projects, {} pending ({})",
        report.detailed,
        report.pending_details(),
        details.path().display()
    );
    for (state, count) in &report.states {
        log::info!("  {state}: {count}");
    }

    Ok(report)
}
