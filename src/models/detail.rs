//! Enrichment-stage project detail record.

use serde::{Deserialize, Serialize};

use super::Location;

/// Creator profile, assembled from the GraphQL query plus a secondary scrape
/// of the profile page for the join date (the one field the structured query
/// does not expose).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    /// Upstream relay-style creator id
    pub id: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub biography: Option<String>,
    #[serde(default)]
    pub websites: Vec<String>,
    pub backed_count: Option<i64>,
    pub projects_count: Option<i64>,
    /// `None` when the profile-page fetch failed (partial record)
    pub joined_at: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

/// A campaign FAQ entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// A single reward/pledge tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub backers_count: i64,
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub is_limited: bool,
    pub limit: Option<i64>,
}

/// Deep per-project fields fetched by the enrichment stage.
///
/// Joined 1:1 to `Project` by `id`. On re-fetch the whole record is replaced,
/// never field-merged. Counts and mention tallies over these fields are
/// derived at export time rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    /// Foreign key = `Project::id`
    pub id: u64,
    pub slug: Option<String>,

    #[serde(default)]
    pub creator: Option<Creator>,

    /// Campaign story with markup stripped
    #[serde(default)]
    pub story_text: String,

    /// Risks-and-challenges text, one entry per paragraph block
    #[serde(default)]
    pub risks: Vec<String>,

    #[serde(default)]
    pub faqs: Vec<Faq>,

    #[serde(default)]
    pub rewards: Vec<RewardTier>,
}
