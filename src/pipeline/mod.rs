//! Pipeline entry points for the harvester stages.
//!
//! - `run_scrape`: Discover candidate projects via paginated search
//! - `run_details`: Enrich discovered projects with campaign details
//! - `run_export`: Merge both stores into CSV and Arrow exports
//! - `run_stats`: Summarize store contents without touching the network

pub mod details;
pub mod export;
pub mod scrape;
pub mod stats;

pub use details::run_details;
pub use export::run_export;
pub use scrape::run_scrape;
pub use stats::{run_stats, StatsReport};
