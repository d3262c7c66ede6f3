// src/services/mod.rs

//! Pipeline-stage services: parsing, discovery crawling, detail enrichment.

pub mod detail;
pub mod discover;
pub mod parser;

pub use detail::DetailEnricher;
pub use discover::DiscoveryCrawler;
