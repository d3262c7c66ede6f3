//! Detail enricher service.
//!
//! Consumes the discovery store's id universe in iteration order and fills
//! the detail store. Default mode skips ids already enriched, so interrupted
//! runs resume where they left off. Re-fetch mode ignores prior progress,
//! buffers the whole run in memory, and commits once through `rewrite_all`,
//! so an interrupted re-fetch leaves the original store untouched.

use crate::client::{BASE_URL, ProjectApi};
use crate::error::Result;
use crate::models::{EnrichOutcome, Project, ProjectDetail};
use crate::services::parser::{extract_joined_at, parse_detail};
use crate::storage::RecordStore;

/// Service for enriching discovered projects with deep detail.
pub struct DetailEnricher<'a, A: ProjectApi> {
    api: &'a A,
}

impl<'a, A: ProjectApi> DetailEnricher<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Run enrichment over every project in the discovery store.
    ///
    /// Per-id failures are logged and skipped, never fatal; skipped ids stay
    /// absent from the detail store and are retried on the next default-mode
    /// invocation.
    pub async fn run(
        &self,
        discovery: &RecordStore,
        detail_store: &mut RecordStore,
        rescrape: bool,
    ) -> Result<EnrichOutcome> {
        let mut outcome = EnrichOutcome::default();
        let mut rescrape_buffer: Vec<ProjectDetail> = Vec::new();

        let total = discovery.len();
        for (index, project) in discovery.iter::<Project>()?.enumerate() {
            let key = project.id.to_string();
            if !rescrape && detail_store.contains(&key) {
                outcome.skipped_present += 1;
                continue;
            }

            log::info!("[{}/{}] {}", index + 1, total, project.name);

            match self.fetch_one(&project, &mut outcome).await {
                Ok(detail) => {
                    if rescrape {
                        rescrape_buffer.push(detail);
                    } else {
                        detail_store.append_if_absent(&detail)?;
                    }
                    outcome.fetched += 1;
                }
                Err(e) => {
                    outcome.skipped_error += 1;
                    log::warn!("Skipping {} ({}): {e}", project.id, project.name);
                }
            }
        }

        if rescrape {
            detail_store.rewrite_all(&rescrape_buffer)?;
            log::info!(
                "Rescrape committed: {} records rewritten",
                rescrape_buffer.len()
            );
        }

        log::info!(
            "Enrichment done: {} fetched ({} partial), {} already present, {} errors",
            outcome.fetched,
            outcome.partial,
            outcome.skipped_present,
            outcome.skipped_error
        );
        Ok(outcome)
    }

    /// Fetch and assemble one detail record.
    ///
    /// A failed structured query discards the whole record (caller skips the
    /// id). A failed creator-profile fetch only leaves `joined_at` empty; the
    /// record is still returned and `partial` is counted.
    async fn fetch_one(
        &self,
        project: &Project,
        outcome: &mut EnrichOutcome,
    ) -> Result<ProjectDetail> {
        let slug = project
            .slug
            .clone()
            .ok_or_else(|| crate::error::AppError::validation("project without slug"))?;
        let project_url = project
            .url
            .clone()
            .unwrap_or_else(|| format!("{BASE_URL}/projects/{slug}"));

        let node = self.api.project_detail(&slug, &project_url).await?;
        let mut detail = parse_detail(project.id, Some(slug), &node);

        if let Some(creator) = detail.creator.as_mut() {
            if let Some(creator_slug) = creator.slug.clone() {
                match self.api.creator_profile_html(&creator_slug).await {
                    Ok(html) => {
                        creator.joined_at = extract_joined_at(&html);
                        if creator.joined_at.is_none() {
                            log::debug!("No join date on profile page of {creator_slug}");
                        }
                    }
                    Err(e) => {
                        outcome.partial += 1;
                        log::warn!(
                            "Profile fetch failed for {creator_slug} (project {}): {e}. \
                             Keeping record without join date",
                            project.id
                        );
                    }
                }
            }
        }

        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::client::DiscoverPage;
    use crate::error::AppError;

    /// Serves canned detail nodes and profile pages by slug. Slugs listed in
    /// `pending_details` never resolve, simulating a hung request.
    #[derive(Default)]
    struct StubApi {
        details: HashMap<String, Value>,
        profiles: HashMap<String, String>,
        failing_details: HashSet<String>,
        pending_details: HashSet<String>,
        failing_profiles: HashSet<String>,
        detail_calls: AtomicUsize,
    }

    #[async_trait]
    impl ProjectApi for StubApi {
        async fn discover_page(
            &self,
            _term: &str,
            _category_id: Option<u64>,
            _page: u32,
        ) -> Result<DiscoverPage> {
            unreachable!("enrichment never discovers")
        }

        async fn project_detail(&self, slug: &str, _url: &str) -> Result<Value> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.pending_details.contains(slug) {
                std::future::pending::<()>().await;
            }
            if self.failing_details.contains(slug) {
                return Err(AppError::transport(slug, "simulated outage"));
            }
            self.details
                .get(slug)
                .cloned()
                .ok_or_else(|| AppError::transport(slug, "no project node"))
        }

        async fn creator_profile_html(&self, creator_slug: &str) -> Result<String> {
            if self.failing_profiles.contains(creator_slug) {
                return Err(AppError::transport(creator_slug, "simulated outage"));
            }
            self.profiles
                .get(creator_slug)
                .cloned()
                .ok_or_else(|| AppError::transport(creator_slug, "no profile"))
        }
    }

    fn node(story: &str, creator_slug: &str) -> Value {
        json!({
            "story": format!("<p>{story}</p>"),
            "risks": "Things may slip.",
            "creator": {
                "id": "VXNlci0x",
                "name": "Jane",
                "slug": creator_slug,
                "websites": [],
            },
            "faqs": { "nodes": [] },
            "rewards": { "nodes": [] },
        })
    }

    fn profile_html(joined: &str) -> String {
        format!(r#"<head><meta property="joined" content="{joined}"/></head>"#)
    }

    fn project(id: u64) -> Project {
        Project {
            id,
            slug: Some(format!("p-{id}")),
            name: format!("Project {id}"),
            ..Default::default()
        }
    }

    fn stores_in(dir: &tempfile::TempDir, projects: &[Project]) -> (RecordStore, RecordStore) {
        let mut discovery = RecordStore::open(dir.path().join("projects.jsonl")).unwrap();
        for p in projects {
            discovery.append(p).unwrap();
        }
        let details = RecordStore::open(dir.path().join("details.jsonl")).unwrap();
        (discovery, details)
    }

    #[tokio::test]
    async fn enriches_every_discovered_project() {
        let mut api = StubApi::default();
        api.details.insert("p-1".into(), node("Story one", "jane"));
        api.details.insert("p-2".into(), node("Story two", "jane"));
        api.profiles
            .insert("jane".into(), profile_html("2020-01-15T00:00:00Z"));

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1), project(2)]);

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();

        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.partial, 0);
        assert_eq!(details.len(), 2);

        let records: Vec<ProjectDetail> = details.load_all().unwrap();
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].story_text, "Story one");
        let creator = records[0].creator.as_ref().unwrap();
        assert_eq!(creator.joined_at.as_deref(), Some("2020-01-15"));
    }

    #[tokio::test]
    async fn resume_skips_already_detailed_ids() {
        let mut api = StubApi::default();
        api.details.insert("p-1".into(), node("Story one", "jane"));
        api.details.insert("p-2".into(), node("Story two", "jane"));
        api.profiles
            .insert("jane".into(), profile_html("2020-01-15"));

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1), project(2)]);

        // First pass fills the store
        DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();
        api.detail_calls.store(0, Ordering::SeqCst);

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();

        assert_eq!(outcome.fetched, 0);
        assert_eq!(outcome.skipped_present, 2);
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_skips_the_id_and_retries_next_run() {
        let mut api = StubApi::default();
        api.details.insert("p-2".into(), node("Story two", "jane"));
        api.profiles
            .insert("jane".into(), profile_html("2020-01-15"));
        api.failing_details.insert("p-1".into());

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1), project(2)]);

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();
        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.skipped_error, 1);
        assert!(!details.contains("1"));
        assert!(details.contains("2"));

        // Upstream recovers; the failed id is picked up on the next run
        api.failing_details.clear();
        api.details.insert("p-1".into(), node("Story one", "jane"));

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();
        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.skipped_present, 1);
        assert!(details.contains("1"));
    }

    #[tokio::test]
    async fn profile_failure_keeps_the_record_without_join_date() {
        let mut api = StubApi::default();
        api.details.insert("p-1".into(), node("Story one", "jane"));
        api.failing_profiles.insert("jane".into());

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1)]);

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();

        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.partial, 1);
        let records: Vec<ProjectDetail> = details.load_all().unwrap();
        let creator = records[0].creator.as_ref().unwrap();
        assert_eq!(creator.joined_at, None);
    }

    #[tokio::test]
    async fn project_without_slug_is_counted_as_error() {
        let api = StubApi::default();
        let tmp = tempfile::TempDir::new().unwrap();
        let mut slugless = project(1);
        slugless.slug = None;
        let (discovery, mut details) = stores_in(&tmp, &[slugless]);

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();

        assert_eq!(outcome.skipped_error, 1);
        assert!(details.is_empty());
    }

    #[tokio::test]
    async fn rescrape_replaces_stored_records() {
        let mut api = StubApi::default();
        api.details.insert("p-1".into(), node("Old story", "jane"));
        api.profiles
            .insert("jane".into(), profile_html("2020-01-15"));

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1)]);

        DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();

        // Upstream content changed; a plain rerun would not notice
        api.details.insert("p-1".into(), node("New story", "jane"));

        let outcome = DetailEnricher::new(&api)
            .run(&discovery, &mut details, true)
            .await
            .unwrap();

        assert_eq!(outcome.fetched, 1);
        assert_eq!(details.len(), 1);
        let records: Vec<ProjectDetail> = details.load_all().unwrap();
        assert_eq!(records[0].story_text, "New story");
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_rescrape_leaves_the_store_bytes_untouched() {
        use std::time::Duration;

        let mut api = StubApi::default();
        api.details.insert("p-1".into(), node("Story one", "jane"));
        api.details.insert("p-2".into(), node("Story two", "jane"));
        api.profiles
            .insert("jane".into(), profile_html("2020-01-15"));

        let tmp = tempfile::TempDir::new().unwrap();
        let (discovery, mut details) = stores_in(&tmp, &[project(1), project(2)]);
        let store_path = tmp.path().join("details.jsonl");

        DetailEnricher::new(&api)
            .run(&discovery, &mut details, false)
            .await
            .unwrap();
        let before = std::fs::read(&store_path).unwrap();

        // Re-fetch sees changed content but hangs on the second project and
        // is cancelled before the commit
        api.details.insert("p-1".into(), node("New story", "jane"));
        api.pending_details.insert("p-2".into());

        let enricher = DetailEnricher::new(&api);
        let interrupted = tokio::time::timeout(
            Duration::from_secs(5),
            enricher.run(&discovery, &mut details, true),
        )
        .await;
        assert!(interrupted.is_err());

        let after = std::fs::read(&store_path).unwrap();
        assert_eq!(before, after);

        // The reopened store still resumes from the committed state
        let reopened = RecordStore::open(&store_path).unwrap();
        assert_eq!(reopened.len(), 2);
        let records: Vec<ProjectDetail> = reopened.load_all().unwrap();
        assert_eq!(records[0].story_text, "Story one");
    }
}
