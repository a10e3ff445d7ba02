// crates/counsel-server/src/similarity/jaccard.rs
// Word-set Jaccard similarity (zero-dependency floor of the fallback chain)

use super::SimilarityBackend;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Jaccard similarity over lowercased whitespace-token sets.
pub struct JaccardBackend;

impl JaccardBackend {
    fn word_set(text: &str) -> HashSet<String> {
        text.split_whitespace()
            .map(|w| w.to_lowercase())
            .collect()
    }

    pub fn score(a: &str, b: &str) -> f64 {
        let set_a = Self::word_set(a);
        let set_b = Self::word_set(b);
        if set_a.is_empty() && set_b.is_empty() {
            return 0.0;
        }
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

#[async_trait]
impl SimilarityBackend for JaccardBackend {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        Ok(Self::score(a, b))
    }

    fn name(&self) -> &'static str {
        "jaccard"
    }
}
