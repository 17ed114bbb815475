//! Selective persistence of vision reanalyses.
//!
//! Every successful reanalysis is cached, but only some become chunks in
//! the vector store. [`PersistencePolicy`] is the single decision point so
//! the heuristic can be swapped or tested without a vision service.

use serde::Serialize;

use crate::lexicon;

/// Default minimum confidence gain over the baseline.
pub const DEFAULT_MIN_GAIN: f64 = 0.3;

/// Default confidence above which an analysis is kept on its own merit.
pub const DEFAULT_HIGH_CONFIDENCE: f64 = 0.8;

/// Absorbs float error in `analysis - baseline` so a gain of exactly
/// `min_gain` counts.
const GAIN_EPSILON: f64 = 1e-9;

/// Everything the policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceInput<'a> {
    /// Confidence of the initial retrieval, before reanalysis.
    pub baseline_confidence: f64,
    /// Confidence estimated for the new analysis.
    pub analysis_confidence: f64,
    pub analysis: &'a str,
    pub query: &'a str,
}

/// Why an analysis was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistReason {
    ConfidenceGain,
    StructuredData,
    ImportantTopic,
    HighConfidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reasons", rename_all = "snake_case")]
pub enum PersistenceDecision {
    Persist(Vec<PersistReason>),
    Skip,
}

impl PersistenceDecision {
    pub fn should_persist(&self) -> bool {
        matches!(self, PersistenceDecision::Persist(_))
    }
}

/// Decides whether a reanalysis is written to the vector store.
pub trait PersistencePolicy: Send + Sync {
    fn decide(&self, input: &PersistenceInput<'_>) -> PersistenceDecision;
}

/// Keeps an analysis when any of: the gain over baseline reaches
/// `min_gain`, the text has structured pin/component data, the query is
/// on an important topic, or the analysis confidence exceeds
/// `high_confidence`.
#[derive(Debug, Clone, Copy)]
pub struct DefaultPersistencePolicy {
    pub min_gain: f64,
    pub high_confidence: f64,
}

impl Default for DefaultPersistencePolicy {
    fn default() -> Self {
        Self {
            min_gain: DEFAULT_MIN_GAIN,
            high_confidence: DEFAULT_HIGH_CONFIDENCE,
        }
    }
}

impl PersistencePolicy for DefaultPersistencePolicy {
    fn decide(&self, input: &PersistenceInput<'_>) -> PersistenceDecision {
        let mut reasons = Vec::new();

        if input.analysis_confidence - input.baseline_confidence >= self.min_gain - GAIN_EPSILON {
            reasons.push(PersistReason::ConfidenceGain);
        }
        if lexicon::has_structured_data(input.analysis) {
            reasons.push(PersistReason::StructuredData);
        }
        if lexicon::touches_important_topic(input.query) {
            reasons.push(PersistReason::ImportantTopic);
        }
        if input.analysis_confidence > self.high_confidence {
            reasons.push(PersistReason::HighConfidence);
        }

        if reasons.is_empty() {
            PersistenceDecision::Skip
        } else {
            PersistenceDecision::Persist(reasons)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(baseline: f64, confidence: f64, analysis: &'a str, query: &'a str) -> PersistenceInput<'a> {
        PersistenceInput {
            baseline_confidence: baseline,
            analysis_confidence: confidence,
            analysis,
            query,
        }
    }

    #[test]
    fn test_low_value_analysis_skipped() {
        let policy = DefaultPersistencePolicy::default();
        let d = policy.decide(&input(0.5, 0.7, "A board outline with a few labels.", "which pin is the LED on"));
        assert_eq!(d, PersistenceDecision::Skip);
    }

    #[test]
    fn test_confidence_gain_persists() {
        let policy = DefaultPersistencePolicy::default();
        let d = policy.decide(&input(0.3, 0.6, "A board outline.", "which pin is the LED on"));
        assert_eq!(d, PersistenceDecision::Persist(vec![PersistReason::ConfidenceGain]));
    }

    #[test]
    fn test_structured_data_persists() {
        let policy = DefaultPersistencePolicy::default();
        let d = policy.decide(&input(0.7, 0.75, "LED: D13\nBTN: D2", "which pin is the LED on"));
        assert_eq!(d, PersistenceDecision::Persist(vec![PersistReason::StructuredData]));
    }

    #[test]
    fn test_important_topic_persists() {
        let policy = DefaultPersistencePolicy::default();
        let d = policy.decide(&input(0.7, 0.75, "A board outline.", "board pinout"));
        assert_eq!(d, PersistenceDecision::Persist(vec![PersistReason::ImportantTopic]));
    }

    #[test]
    fn test_high_confidence_bound_is_exclusive() {
        let policy = DefaultPersistencePolicy::default();
        let at_bound = policy.decide(&input(0.7, 0.8, "A board outline.", "which pin is the LED on"));
        assert!(!at_bound.should_persist());
        let above = policy.decide(&input(0.7, 0.81, "A board outline.", "which pin is the LED on"));
        assert_eq!(above, PersistenceDecision::Persist(vec![PersistReason::HighConfidence]));
    }
}
