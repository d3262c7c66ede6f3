// src/config.rs

//! Application configuration structures.
//!
//! Loaded from a single TOML file with per-field defaults, so a minimal
//! config only needs to override what differs from the reference deployment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Search terms, categories and state filters
    #[serde(default)]
    pub search: SearchConfig,

    /// HTTP and pacing behavior
    #[serde(default)]
    pub scraping: ScrapingConfig,

    /// Topical vocabulary for relevance filtering
    #[serde(default)]
    pub relevance: RelevanceConfig,

    /// Store and export locations
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.search.terms.is_empty() {
            return Err(AppError::validation("search.terms is empty"));
        }
        if !self.search.search_all_categories && self.search.category_ids.is_empty() {
            return Err(AppError::validation(
                "search.category_ids is empty and search_all_categories is off",
            ));
        }
        if self.scraping.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraping.user_agent is empty"));
        }
        if self.scraping.timeout_secs == 0 {
            return Err(AppError::validation("scraping.timeout_secs must be > 0"));
        }
        if self.scraping.max_pages == 0 {
            return Err(AppError::validation("scraping.max_pages must be > 0"));
        }
        if self.relevance.vocabulary.is_empty() {
            return Err(AppError::validation("relevance.vocabulary is empty"));
        }
        if self.relevance.min_mentions == 0 {
            return Err(AppError::validation("relevance.min_mentions must be > 0"));
        }
        Ok(())
    }
}

/// Search query settings: the discovery crawl walks the cross-product of
/// terms and categories in the order given here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search terms, processed in order
    #[serde(default = "defaults::terms")]
    pub terms: Vec<String>,

    /// Kickstarter category ids to search within (in addition to the
    /// all-categories pass when `search_all_categories` is on)
    #[serde(default)]
    pub category_ids: Vec<u64>,

    /// Run each term once without a category filter
    #[serde(default = "defaults::yes")]
    pub search_all_categories: bool,

    /// Project states to keep (empty = keep all)
    #[serde(default)]
    pub allowed_states: Vec<String>,

    /// Sort order parameter passed to the discover endpoint
    #[serde(default = "defaults::sort")]
    pub sort: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            terms: defaults::terms(),
            category_ids: Vec::new(),
            search_all_categories: true,
            allowed_states: Vec::new(),
            sort: defaults::sort(),
        }
    }
}

/// HTTP client and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum interval between outbound requests in milliseconds
    #[serde(default = "defaults::rate_limit")]
    pub rate_limit_ms: u64,

    /// Bounded retries for a failed page fetch
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Pagination cap per (term, category) pair
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// GraphQL queries between session/CSRF refreshes
    #[serde(default = "defaults::session_refresh")]
    pub session_refresh_interval: u32,

    /// Base URL of a Browserless-compatible rendering service used as the
    /// fallback transport. No fallback when unset.
    #[serde(default)]
    pub render_url: Option<String>,

    /// API token for the rendering service
    #[serde(default)]
    pub render_token: Option<String>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            rate_limit_ms: defaults::rate_limit(),
            max_retries: defaults::max_retries(),
            max_pages: defaults::max_pages(),
            session_refresh_interval: defaults::session_refresh(),
            render_url: None,
            render_token: None,
        }
    }
}

/// Topical relevance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// Vocabulary terms, matched case-insensitively on word boundaries
    #[serde(default = "defaults::vocabulary")]
    pub vocabulary: Vec<String>,

    /// Minimum mention count for a project to be kept during discovery
    #[serde(default = "defaults::min_mentions")]
    pub min_mentions: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            vocabulary: defaults::vocabulary(),
            min_mentions: defaults::min_mentions(),
        }
    }
}

/// Store and export file locations, all under one data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for stores and exports
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

impl OutputConfig {
    /// Discovery store (append-only JSONL of Project records).
    pub fn discovery_store_path(&self) -> PathBuf {
        self.data_dir.join("raw/projects.jsonl")
    }

    /// Detail store (append-only JSONL of ProjectDetail records).
    pub fn detail_store_path(&self) -> PathBuf {
        self.data_dir.join("raw/project_details.jsonl")
    }

    /// Row-oriented export with header row.
    pub fn csv_path(&self) -> PathBuf {
        self.data_dir.join("exports/projects.csv")
    }

    /// Columnar export with the identical logical schema.
    pub fn arrow_path(&self) -> PathBuf {
        self.data_dir.join("exports/projects.arrow")
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn yes() -> bool {
        true
    }

    // Search defaults
    pub fn terms() -> Vec<String> {
        vec![
            "artificial intelligence".into(),
            "machine learning".into(),
            "AI".into(),
        ]
    }
    pub fn sort() -> String {
        "newest".into()
    }

    // Scraping defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; ks-harvest/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn rate_limit() -> u64 {
        1000
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn max_pages() -> u32 {
        100
    }
    pub fn session_refresh() -> u32 {
        50
    }

    // Relevance defaults
    pub fn vocabulary() -> Vec<String> {
        vec![
            "artificial intelligence".into(),
            "machine learning".into(),
            "deep learning".into(),
            "neural network".into(),
            "large language model".into(),
            "generative AI".into(),
            "computer vision".into(),
            "AI".into(),
        ]
    }
    pub fn min_mentions() -> usize {
        1
    }

    // Output defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_terms() {
        let mut config = Config::default();
        config.search.terms.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_vocabulary() {
        let mut config = Config::default();
        config.relevance.vocabulary.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.scraping.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_categoryless_search() {
        let mut config = Config::default();
        config.search.search_all_categories = false;
        config.search.category_ids.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("[search]\nterms = [\"robotics\"]\n").unwrap();
        assert_eq!(config.search.terms, vec!["robotics"]);
        assert_eq!(config.scraping.rate_limit_ms, 1000);
        assert!(config.scraping.render_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn output_paths_nest_under_data_dir() {
        let output = OutputConfig {
            data_dir: PathBuf::from("/tmp/ks"),
        };
        assert_eq!(
            output.discovery_store_path(),
            PathBuf::from("/tmp/ks/raw/projects.jsonl")
        );
        assert_eq!(
            output.arrow_path(),
            PathBuf::from("/tmp/ks/exports/projects.arrow")
        );
    }
}
