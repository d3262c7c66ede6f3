// src/relevance.rs

//! Topical relevance scoring.
//!
//! One scorer instance is shared by discovery filtering and by the export
//! engine's `campaign_ai_mentions` derivation, so the filter decision and the
//! exported count always come from the same rule.

use regex::Regex;

use crate::config::RelevanceConfig;
use crate::error::{AppError, Result};

/// Counts occurrences of a configured vocabulary in free text.
///
/// Terms are matched case-insensitively on word boundaries; pure and
/// deterministic, no I/O.
#[derive(Debug)]
pub struct RelevanceScorer {
    patterns: Vec<Regex>,
    threshold: usize,
}

impl RelevanceScorer {
    /// Compile a scorer from vocabulary terms and a mention threshold.
    pub fn new(vocabulary: &[String], threshold: usize) -> Result<Self> {
        let patterns = vocabulary
            .iter()
            .map(|term| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
                Regex::new(&pattern)
                    .map_err(|e| AppError::config(format!("bad vocabulary term '{term}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            threshold: threshold.max(1),
        })
    }

    /// Build a scorer straight from the relevance config section.
    pub fn from_config(config: &RelevanceConfig) -> Result<Self> {
        Self::new(&config.vocabulary, config.min_mentions)
    }

    /// Total vocabulary occurrences in `text`.
    pub fn mentions(&self, text: &str) -> usize {
        self.patterns
            .iter()
            .map(|p| p.find_iter(text).count())
            .sum()
    }

    /// Whether `text` clears the configured mention threshold.
    pub fn is_relevant(&self, text: &str) -> bool {
        self.mentions(text) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer(terms: &[&str], threshold: usize) -> RelevanceScorer {
        let vocab: Vec<String> = terms.iter().map(|s| s.to_string()).collect();
        RelevanceScorer::new(&vocab, threshold).unwrap()
    }

    #[test]
    fn counts_word_boundary_matches() {
        let s = scorer(&["AI"], 1);
        assert_eq!(s.mentions("AI assistant with real AI inside"), 2);
    }

    #[test]
    fn does_not_match_inside_words() {
        let s = scorer(&["AI"], 1);
        assert_eq!(s.mentions("maintain PAID plaid"), 0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let s = scorer(&["machine learning"], 1);
        assert_eq!(s.mentions("Machine Learning and MACHINE LEARNING"), 2);
    }

    #[test]
    fn multi_term_vocabulary_sums_counts() {
        let s = scorer(&["AI", "neural network"], 1);
        assert_eq!(s.mentions("An AI built on a neural network"), 2);
    }

    #[test]
    fn threshold_gates_relevance() {
        let s = scorer(&["robot"], 2);
        assert!(!s.is_relevant("one robot"));
        assert!(s.is_relevant("robot meets robot"));
    }

    #[test]
    fn empty_text_is_irrelevant() {
        let s = scorer(&["AI"], 1);
        assert_eq!(s.mentions(""), 0);
        assert!(!s.is_relevant(""));
    }
}
