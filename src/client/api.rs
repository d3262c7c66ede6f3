//! Upstream API surface consumed by the pipeline services.
//!
//! `ProjectApi` is the seam between the crawl/enrich logic and the network;
//! tests drive the services with stub implementations, production uses
//! [`KickstarterApi`] over the dual-path [`TransportClient`].

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;

use super::TransportClient;
use crate::error::{AppError, Result};

pub const BASE_URL: &str = "https://www.kickstarter.com";

/// One page of discover results.
#[derive(Debug, Default, Clone)]
pub struct DiscoverPage {
    /// Raw project objects, parsed downstream
    pub projects: Vec<serde_json::Value>,
    /// Total result count reported by the endpoint, when present
    pub total_hits: Option<u64>,
}

/// Capability interface over the upstream endpoints.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    /// Fetch one page of search results. `page` starts at 1.
    async fn discover_page(
        &self,
        term: &str,
        category_id: Option<u64>,
        page: u32,
    ) -> Result<DiscoverPage>;

    /// Fetch the structured detail record (GraphQL project node) by slug.
    /// `project_url` is the public page used to establish a session.
    async fn project_detail(&self, slug: &str, project_url: &str) -> Result<serde_json::Value>;

    /// Fetch the creator's public profile page HTML.
    async fn creator_profile_html(&self, creator_slug: &str) -> Result<String>;
}

/// GraphQL query for the full project detail, mirroring the fields the
/// structured detail record needs.
const DETAIL_QUERY: &str = r#"query Project($slug: String!) {
  project(slug: $slug) {
    story(assetWidth: 680)
    risks
    backersCount
    goal { amount currency }
    pledged { amount currency }
    state
    stateChangedAt
    launchedAt
    deadlineAt
    location { displayableName name country countryName state }
    creator {
      id
      name
      slug
      url
      biography
      websites { url }
      backingsCount
      launchedProjects { totalCount }
      location { displayableName name country countryName state }
    }
    commentsCount
    posts { totalCount }
    watchesCount
    isProjectWeLove
    faqs { nodes { question answer } }
    rewards {
      nodes {
        name
        description
        amount { amount currency }
        backersCount
        estimatedDeliveryOn
        limit
      }
    }
  }
}"#;

/// A cookie-backed session with the CSRF token the GraphQL endpoint requires.
#[derive(Debug)]
struct Session {
    csrf_token: String,
    queries: u32,
}

/// Production [`ProjectApi`] over the Kickstarter public endpoints.
///
/// The GraphQL endpoint needs cookies plus a CSRF token scraped from any
/// project page, so a session is acquired lazily per fetch burst, refreshed
/// after a configured number of queries, and dropped with this value.
pub struct KickstarterApi {
    transport: TransportClient,
    session: Mutex<Option<Session>>,
    session_refresh_interval: u32,
    sort: String,
}

impl KickstarterApi {
    pub fn new(transport: TransportClient, session_refresh_interval: u32, sort: &str) -> Self {
        Self {
            transport,
            session: Mutex::new(None),
            session_refresh_interval: session_refresh_interval.max(1),
            sort: sort.to_string(),
        }
    }

    /// Pull the CSRF meta token from a project page.
    fn extract_csrf_token(html: &str) -> Option<String> {
        // <meta name="csrf-token" content="..." />
        let re = Regex::new(r#"<meta\s+name="csrf-token"\s+content="([^"]+)""#).ok()?;
        re.captures(html).map(|c| c[1].to_string())
    }

    async fn ensure_session(&self, project_url: &str) -> Result<String> {
        let mut guard = self.session.lock().await;

        let needs_refresh = match guard.as_ref() {
            Some(session) => session.queries >= self.session_refresh_interval,
            None => true,
        };

        if needs_refresh {
            log::debug!("Acquiring session via {project_url}");
            let html = self.transport.fetch_text(project_url).await?;
            let csrf_token = Self::extract_csrf_token(&html).ok_or_else(|| {
                AppError::transport(project_url, "no CSRF token in project page")
            })?;
            *guard = Some(Session {
                csrf_token,
                queries: 0,
            });
        }

        let session = guard.as_mut().expect("session populated above");
        session.queries += 1;
        Ok(session.csrf_token.clone())
    }
}

#[async_trait]
impl ProjectApi for KickstarterApi {
    async fn discover_page(
        &self,
        term: &str,
        category_id: Option<u64>,
        page: u32,
    ) -> Result<DiscoverPage> {
        let mut url = url::Url::parse(&format!("{BASE_URL}/discover/advanced.json"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("term", term);
            if let Some(category_id) = category_id {
                query.append_pair("category_id", &category_id.to_string());
            }
            query.append_pair("sort", &self.sort);
            query.append_pair("page", &page.to_string());
        }

        let data = self.transport.fetch_json(url.as_str()).await?;
        let projects = data
            .get("projects")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();
        let total_hits = data.get("total_hits").and_then(|t| t.as_u64());

        Ok(DiscoverPage {
            projects,
            total_hits,
        })
    }

    async fn project_detail(&self, slug: &str, project_url: &str) -> Result<serde_json::Value> {
        let csrf_token = self.ensure_session(project_url).await?;

        let body = serde_json::json!({
            "query": DETAIL_QUERY,
            "variables": { "slug": slug },
        });
        let url = format!("{BASE_URL}/graph");
        let data = self.transport.post_graphql(&url, &body, &csrf_token).await?;

        if let Some(errors) = data.get("errors").and_then(|e| e.as_array()) {
            let message = errors
                .first()
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown GraphQL error");
            return Err(AppError::transport(&url, format!("GraphQL: {message}")));
        }

        data.pointer("/data/project")
            .filter(|node| !node.is_null())
            .cloned()
            .ok_or_else(|| AppError::transport(&url, format!("no project node for '{slug}'")))
    }

    async fn creator_profile_html(&self, creator_slug: &str) -> Result<String> {
        self.transport
            .fetch_text(&format!("{BASE_URL}/profile/{creator_slug}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_csrf_token_from_meta_tag() {
        let html = r#"<head><meta name="csrf-token" content="abc123==" /></head>"#;
        assert_eq!(
            KickstarterApi::extract_csrf_token(html),
            Some("abc123==".to_string())
        );
    }

    #[test]
    fn missing_csrf_token_yields_none() {
        assert_eq!(
            KickstarterApi::extract_csrf_token("<html>Just a moment...</html>"),
            None
        );
    }
}
