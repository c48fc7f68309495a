//! Match decision policy.
//!
//! The embedded-model path converts descriptor distance into a similarity
//! percentage and applies a strict threshold. The remote path takes the
//! provider's judgment as-is.

use crate::outcome::ScoredResult;
use crate::types::{FaceAnalysis, Judgment};
use thiserror::Error;

/// Similarity (percent) that must be strictly exceeded for a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 40.0;

#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    #[error("descriptor length mismatch: {first} vs {second}")]
    DimensionMismatch { first: usize, second: usize },
    #[error("descriptor distance is not a finite number")]
    NonFinite,
}

/// Threshold policy for the embedded-model path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    threshold: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl MatchPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `clamp((1 - distance) * 100, 0, 100)`
    pub fn similarity_from_distance(distance: f64) -> f64 {
        ((1.0 - distance) * 100.0).clamp(0.0, 100.0)
    }

    /// Strict comparison: a similarity equal to the threshold is not a match.
    pub fn is_match(&self, similarity: f64) -> bool {
        similarity > self.threshold
    }

    /// Score two embedded-model analyses.
    pub fn score_local(
        &self,
        first: &FaceAnalysis,
        second: &FaceAnalysis,
    ) -> Result<ScoredResult, PolicyError> {
        let distance = first
            .descriptor
            .euclidean_distance(&second.descriptor)
            .ok_or(PolicyError::DimensionMismatch {
                first: first.descriptor.len(),
                second: second.descriptor.len(),
            })? as f64;

        if !distance.is_finite() {
            return Err(PolicyError::NonFinite);
        }

        let similarity = Self::similarity_from_distance(distance);
        let confidence = (first.confidence as f64 + second.confidence as f64) / 2.0 * 100.0;

        Ok(ScoredResult {
            similarity,
            is_match: self.is_match(similarity),
            confidence: Some(confidence),
            distance: Some(distance),
            reasoning: None,
        })
    }

    /// Adopt a remote judgment. The provider's `match` is authoritative;
    /// only the display range of the numbers is normalized.
    pub fn score_remote(judgment: &Judgment) -> ScoredResult {
        let similarity = if judgment.similarity_percentage.is_finite() {
            judgment.similarity_percentage.clamp(0.0, 100.0)
        } else {
            0.0
        };

        ScoredResult {
            similarity,
            is_match: judgment.is_match,
            confidence: judgment
                .confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0) * 100.0),
            distance: None,
            reasoning: Some(judgment.reasoning.clone()),
        }
    }
}
