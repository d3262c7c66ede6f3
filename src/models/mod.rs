// src/models/mod.rs

//! Domain models for the harvester application.

mod detail;
mod project;

pub use detail::{Creator, Faq, ProjectDetail, RewardTier};
pub use project::{Category, Location, Project, ProjectState};

/// Summary of a discovery crawl run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Pages successfully fetched
    pub pages: usize,
    /// Result records seen across all pages
    pub seen: usize,
    /// New records appended to the discovery store
    pub added: usize,
    /// Skipped: already present (cross-query dedup)
    pub duplicate: usize,
    /// Skipped: below the relevance threshold
    pub irrelevant: usize,
    /// Skipped: state not in the allowed list
    pub filtered_state: usize,
    /// (term, category) pairs abandoned after bounded retries
    pub failed_pairs: usize,
}

/// Summary of a detail enrichment run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichOutcome {
    /// Records fetched and written this run
    pub fetched: usize,
    /// Skipped: already in the detail store
    pub skipped_present: usize,
    /// Skipped: fetch or parse failed (retried next run)
    pub skipped_error: usize,
    /// Written with a missing creator join date only
    pub partial: usize,
}

/// Summary of a merge/export run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Rows emitted (one per discovery-store id)
    pub rows: usize,
    /// Rows that had a matching detail record
    pub with_detail: usize,
}
