//! crates/transcript_insights_core/src/similarity.rs
//!
//! Finds earlier pain points that describe the same underlying issue.
//! Matching is advisory: it never fails the write path.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{window_start, SearchScope, SimilarPainPoint, SimilarityQuery};
use crate::ports::InsightStore;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Cosine similarity in [-1, 1]. Mismatched, empty, or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (va, vb) in a.iter().zip(b.iter()) {
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

#[derive(Clone)]
pub struct SimilarityMatcher {
    store: Arc<dyn InsightStore>,
    threshold: f32,
    max_results: usize,
}

impl SimilarityMatcher {
    pub fn new(store: Arc<dyn InsightStore>) -> Self {
        Self {
            store,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Pain points at or above the threshold within `scope`, most similar first.
    ///
    /// `reference_date` anchors a global window; `exclude_meeting_id` keeps the
    /// meeting being processed from matching itself. Returns an empty list when
    /// there is no embedding or the store fails.
    pub async fn find_similar(
        &self,
        embedding: Option<&[f32]>,
        scope: SearchScope,
        reference_date: NaiveDate,
        exclude_meeting_id: Option<Uuid>,
    ) -> Vec<SimilarPainPoint> {
        let Some(embedding) = embedding else {
            return Vec::new();
        };

        let (company_id, since) = match scope {
            SearchScope::Company(company_id) => (Some(company_id), None),
            SearchScope::Global { window_months } => {
                (None, Some(window_start(reference_date, window_months)))
            }
        };
        let query = SimilarityQuery {
            embedding: embedding.to_vec(),
            company_id,
            since,
            exclude_meeting_id,
            threshold: self.threshold,
            limit: self.max_results,
        };

        match self.store.find_similar_pain_points(&query).await {
            Ok(mut matches) => {
                matches.retain(|m| m.similarity >= self.threshold);
                matches.truncate(self.max_results);
                debug!(?scope, matches = matches.len(), "Similarity search finished");
                matches
            }
            Err(e) => {
                warn!(?scope, "Similarity search failed, treating as no matches: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
