// src/lib.rs

//! ks-harvest Library
//!
//! Resumable three-stage harvester for crowdfunding project data:
//! discovery crawl, detail enrichment, and merged CSV/Arrow export.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod relevance;
pub mod services;
pub mod storage;
