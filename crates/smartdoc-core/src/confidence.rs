//! Confidence scoring over a ranked result set.
//!
//! # Algorithm
//!
//! Weighted mean over the top [`SCORED_RESULTS`] results, weight `0.5^rank`:
//!
//! ```text
//!            Σ 0.5^i × s_i
//! conf  =  ───────────────        i = 0 .. min(n, 5) - 1
//!             Σ 0.5^i
//! ```
//!
//! `s_i` is the result's similarity. Schematic chunks that carry a recorded
//! `confidence` `c` use `(similarity + c) / 2`, so a vision analysis that was
//! already judged good lifts the result it backs.
//!
//! Empty input scores `0.0`. All terms are in `[0, 1]`, so the mean is too.
//! Raising the top similarity raises `s_0`, which has the largest weight and
//! a positive coefficient, so confidence never drops.

use serde::Serialize;

use crate::models::{clamp_unit, meta, RetrievedChunk};

/// Only the top results contribute.
pub const SCORED_RESULTS: usize = 5;

/// Default boundary between low and medium confidence.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Default boundary between medium and high confidence.
pub const DEFAULT_HIGH: f64 = 0.8;

/// Coarse classification of a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Thresholds used to classify confidence.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    pub threshold: f64,
    pub high: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            high: DEFAULT_HIGH,
        }
    }
}

impl ConfidenceScorer {
    pub fn new(threshold: f64, high: f64) -> Self {
        Self { threshold, high }
    }

    /// Score a ranked result set. Results are taken in the order given.
    pub fn score(&self, results: &[RetrievedChunk]) -> f64 {
        score_results(results)
    }

    pub fn classify(&self, confidence: f64) -> ConfidenceLevel {
        if confidence < self.threshold {
            ConfidenceLevel::Low
        } else if confidence < self.high {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }

    /// True when confidence is low enough to consider reprocessing.
    pub fn is_low(&self, confidence: f64) -> bool {
        confidence < self.threshold
    }
}

/// Per-result contribution before weighting.
pub fn result_score(result: &RetrievedChunk) -> f64 {
    let similarity = clamp_unit(result.similarity);
    if result.chunk.is_schematic() {
        if let Some(recorded) = result.chunk.metadata_f64(meta::CONFIDENCE) {
            return (similarity + clamp_unit(recorded)) / 2.0;
        }
    }
    similarity
}

/// Rank-decayed weighted mean; see the module docs.
pub fn score_results(results: &[RetrievedChunk]) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (i, result) in results.iter().take(SCORED_RESULTS).enumerate() {
        let weight = 0.5f64.powi(i as i32);
        weighted += result_score(result) * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        clamp_unit(weighted / total_weight)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ContentCategory, SourceType};
    use chrono::Utc;
    use serde_json::{Map, Value};

    fn result(id: &str, similarity: f64, rank: usize) -> RetrievedChunk {
        RetrievedChunk::new(
            Chunk {
                id: id.to_string(),
                content: String::new(),
                source: "doc.pdf".to_string(),
                source_type: SourceType::Document,
                category: ContentCategory::Text,
                location: None,
                metadata: Map::new(),
                created_at: Utc::now(),
            },
            similarity,
            rank,
        )
    }

    fn schematic(id: &str, similarity: f64, recorded: f64) -> RetrievedChunk {
        let mut r = result(id, similarity, 0);
        r.chunk.category = ContentCategory::Schematic;
        r.chunk
            .metadata
            .insert(meta::CONFIDENCE.to_string(), Value::from(recorded));
        r
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(score_results(&[]), 0.0);
    }

    #[test]
    fn test_single_result_is_its_similarity() {
        let conf = score_results(&[result("a", 0.7, 0)]);
        assert!((conf - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_top_rank_weighs_more() {
        let good_first = score_results(&[result("a", 0.9, 0), result("b", 0.1, 1)]);
        let good_second = score_results(&[result("a", 0.1, 0), result("b", 0.9, 1)]);
        assert!(good_first > good_second);
    }

    #[test]
    fn test_only_top_five_count() {
        let mut rs: Vec<RetrievedChunk> = (0..5).map(|i| result(&i.to_string(), 0.5, i)).collect();
        let base = score_results(&rs);
        rs.push(result("6", 0.0, 5));
        assert!((score_results(&rs) - base).abs() < 1e-12);
    }

    #[test]
    fn test_always_bounded() {
        let rs = vec![result("a", 3.0, 0), result("b", -2.0, 1), result("c", f64::NAN, 2)];
        let conf = score_results(&rs);
        assert!((0.0..=1.0).contains(&conf), "out of range: {}", conf);
    }

    #[test]
    fn test_monotonic_in_top_similarity() {
        let tail = vec![result("b", 0.4, 1), result("c", 0.2, 2), result("d", 0.9, 3)];
        let mut previous = -1.0;
        for step in 0..=20 {
            let top = step as f64 / 20.0;
            let mut rs = vec![result("a", top, 0)];
            rs.extend(tail.iter().cloned());
            let conf = score_results(&rs);
            assert!(conf >= previous, "confidence dropped at top={}", top);
            previous = conf;
        }
    }

    #[test]
    fn test_schematic_recorded_confidence_averaged() {
        let conf = score_results(&[schematic("s", 0.2, 0.8)]);
        assert!((conf - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_all_far_results_score_low() {
        let rs: Vec<RetrievedChunk> = (0..5).map(|i| result(&i.to_string(), 0.05, i)).collect();
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.classify(scorer.score(&rs)), ConfidenceLevel::Low);
    }

    #[test]
    fn test_classify_boundaries() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.classify(0.59), ConfidenceLevel::Low);
        assert_eq!(scorer.classify(0.6), ConfidenceLevel::Medium);
        assert_eq!(scorer.classify(0.79), ConfidenceLevel::Medium);
        assert_eq!(scorer.classify(0.8), ConfidenceLevel::High);
        assert!(scorer.is_low(0.13));
        assert!(!scorer.is_low(0.85));
    }
}
