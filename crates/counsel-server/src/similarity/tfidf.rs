// crates/counsel-server/src/similarity/tfidf.rs
// TF-IDF cosine similarity over a two-document corpus

use super::SimilarityBackend;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// TF-IDF weighted cosine similarity.
///
/// The vectorizer is fitted per call-pair: the corpus is exactly the
/// two input texts, with smoothed IDF so shared terms still carry
/// weight instead of vanishing at document frequency 2.
pub struct TfidfBackend;

impl TfidfBackend {
    fn term_counts(text: &str) -> HashMap<String, f64> {
        let mut counts = HashMap::new();
        for word in text.split_whitespace() {
            *counts.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
        }
        counts
    }

    pub fn score(a: &str, b: &str) -> f64 {
        let counts_a = Self::term_counts(a);
        let counts_b = Self::term_counts(b);
        if counts_a.is_empty() || counts_b.is_empty() {
            return 0.0;
        }

        let vocabulary: HashSet<&String> = counts_a.keys().chain(counts_b.keys()).collect();
        let n_docs = 2.0_f64;

        let mut dot = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;
        for term in vocabulary {
            let df = (counts_a.contains_key(term) as u8 + counts_b.contains_key(term) as u8) as f64;
            // Smoothed IDF: ln((1 + n) / (1 + df)) + 1
            let idf = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
            let wa = counts_a.get(term).copied().unwrap_or(0.0) * idf;
            let wb = counts_b.get(term).copied().unwrap_or(0.0) * idf;
            dot += wa * wb;
            norm_a += wa * wa;
            norm_b += wb * wb;
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl SimilarityBackend for TfidfBackend {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        Ok(Self::score(a, b))
    }

    fn name(&self) -> &'static str {
        "tfidf"
    }
}
