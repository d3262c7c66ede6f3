//! Discovery-stage project record.

use serde::{Deserialize, Serialize};

/// Project lifecycle state as reported by the discover endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    Live,
    Successful,
    Failed,
    Canceled,
    Suspended,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Live => "live",
            ProjectState::Successful => "successful",
            ProjectState::Failed => "failed",
            ProjectState::Canceled => "canceled",
            ProjectState::Suspended => "suspended",
            ProjectState::Unknown => "unknown",
        }
    }
}

/// Project category, possibly nested under a parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub parent: Option<String>,
}

/// Project or creator location.
///
/// Absent locations are `None` at the field that embeds them; this struct is
/// never used as an all-empty sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_name: Option<String>,
}

/// A project as seen by the discovery crawl.
///
/// Immutable once stored: duplicate sightings across search terms are
/// discarded, never merged. Timestamps are Unix epoch seconds as the upstream
/// API reports them; derived values (percent funded, duration) are computed
/// at export time, not stored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Upstream project id, the sole join key between the two stores
    pub id: u64,

    pub slug: Option<String>,
    pub name: String,
    pub blurb: Option<String>,
    pub url: Option<String>,

    /// Two-letter country code from the discovery payload
    pub country: Option<String>,

    #[serde(default)]
    pub category: Option<Category>,

    // Funding snapshot
    pub backers_count: i64,
    pub goal: f64,
    pub pledged: f64,
    pub currency: Option<String>,
    pub usd_pledged: Option<f64>,
    pub fx_rate: Option<f64>,

    pub state: ProjectState,

    // Unix timestamps (seconds)
    pub launched_at: Option<i64>,
    pub deadline: Option<i64>,
    pub created_at: Option<i64>,
    pub state_changed_at: Option<i64>,

    #[serde(default)]
    pub location: Option<Location>,

    // Engagement counters
    pub comments_count: Option<i64>,
    pub updates_count: Option<i64>,
    pub watches_count: Option<i64>,

    // Flags
    #[serde(default)]
    pub is_staff_pick: bool,
    #[serde(default)]
    pub is_project_we_love: bool,
    #[serde(default)]
    pub spotlight: bool,

    // Media
    #[serde(default)]
    pub has_video: bool,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
}

impl Project {
    /// Text the relevance scorer sees during discovery filtering.
    pub fn search_text(&self) -> String {
        match &self.blurb {
            Some(blurb) => format!("{} {}", self.name, blurb),
            None => self.name.clone(),
        }
    }
}
