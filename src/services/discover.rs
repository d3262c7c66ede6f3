//! Discovery crawler service.
//!
//! Walks the cross-product of configured (search term, category) pairs page
//! by page, filters each result through the relevance scorer and the
//! allowed-state list, and appends new projects to the discovery store.
//! Pair order and page order are deterministic for a given configuration, so
//! the store's append order is reproducible against a stable upstream.

use std::time::Duration;

use crate::client::ProjectApi;
use crate::config::Config;
use crate::error::Result;
use crate::models::DiscoveryOutcome;
use crate::relevance::RelevanceScorer;
use crate::services::parser::parse_project;
use crate::storage::RecordStore;

/// Service for crawling the discover endpoint.
pub struct DiscoveryCrawler<'a, A: ProjectApi> {
    api: &'a A,
    scorer: &'a RelevanceScorer,
    config: &'a Config,
}

impl<'a, A: ProjectApi> DiscoveryCrawler<'a, A> {
    pub fn new(api: &'a A, scorer: &'a RelevanceScorer, config: &'a Config) -> Self {
        Self {
            api,
            scorer,
            config,
        }
    }

    /// The (term, category) pairs in configuration order: the bare term first
    /// when the all-categories pass is enabled, then each category id.
    fn query_pairs(&self) -> Vec<(String, Option<u64>)> {
        let search = &self.config.search;
        let mut pairs = Vec::new();
        for term in &search.terms {
            if search.search_all_categories {
                pairs.push((term.clone(), None));
            }
            for &category_id in &search.category_ids {
                pairs.push((term.clone(), Some(category_id)));
            }
        }
        pairs
    }

    /// Run discovery to completion, appending new projects to `store`.
    ///
    /// A page failure is retried with backoff up to the configured bound;
    /// after that the rest of the pair's pagination is abandoned and the run
    /// continues with the next pair.
    pub async fn run(&self, store: &mut RecordStore) -> Result<DiscoveryOutcome> {
        let mut outcome = DiscoveryOutcome::default();

        for (term, category_id) in self.query_pairs() {
            let label = match category_id {
                Some(id) => format!("'{term}' (category {id})"),
                None => format!("'{term}'"),
            };
            log::info!("Searching {label}");

            if let Err(e) = self
                .crawl_pair(&term, category_id, store, &mut outcome)
                .await
            {
                outcome.failed_pairs += 1;
                log::warn!("Abandoning {label} after retries: {e}");
            }
        }

        log::info!(
            "Discovery done: {} pages, {} seen, {} added ({} duplicate, {} irrelevant, {} filtered by state, {} failed pairs)",
            outcome.pages,
            outcome.seen,
            outcome.added,
            outcome.duplicate,
            outcome.irrelevant,
            outcome.filtered_state,
            outcome.failed_pairs
        );
        Ok(outcome)
    }

    async fn crawl_pair(
        &self,
        term: &str,
        category_id: Option<u64>,
        store: &mut RecordStore,
        outcome: &mut DiscoveryOutcome,
    ) -> Result<()> {
        let max_pages = self.config.scraping.max_pages;
        let mut fetched_for_pair: u64 = 0;

        for page in 1..=max_pages {
            let result = self.fetch_page_with_retry(term, category_id, page).await?;

            if result.projects.is_empty() {
                log::debug!("No more results for '{term}' at page {page}");
                break;
            }
            outcome.pages += 1;
            fetched_for_pair += result.projects.len() as u64;

            for raw in &result.projects {
                outcome.seen += 1;
                let project = match parse_project(raw) {
                    Ok(project) => project,
                    Err(e) => {
                        log::warn!("Unparseable discovery record ('{term}' page {page}): {e}");
                        continue;
                    }
                };

                let key = project.id.to_string();
                if store.contains(&key) {
                    outcome.duplicate += 1;
                    continue;
                }
                if !self.scorer.is_relevant(&project.search_text()) {
                    outcome.irrelevant += 1;
                    continue;
                }
                if !self.state_allowed(&project) {
                    outcome.filtered_state += 1;
                    continue;
                }

                store.append(&project)?;
                outcome.added += 1;
            }

            if let Some(total) = result.total_hits {
                if fetched_for_pair >= total {
                    break;
                }
            }
        }
        Ok(())
    }

    fn state_allowed(&self, project: &crate::models::Project) -> bool {
        let allowed = &self.config.search.allowed_states;
        allowed.is_empty() || allowed.iter().any(|s| s == project.state.as_str())
    }

    async fn fetch_page_with_retry(
        &self,
        term: &str,
        category_id: Option<u64>,
        page: u32,
    ) -> Result<crate::client::DiscoverPage> {
        let max_retries = self.config.scraping.max_retries;
        let mut attempt = 0;
        loop {
            match self.api.discover_page(term, category_id, page).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    log::warn!(
                        "Page {page} of '{term}' failed (attempt {}/{}): {e}. Backing off {:?}",
                        attempt + 1,
                        max_retries,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
