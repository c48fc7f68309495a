//! Result aggregation: run the match policy over every pair of a session.
//!
//! Pairs are independent. A failure in one pair is recorded in that pair's
//! outcome and never stops the pass.

use crate::outcome::{ComparisonOutcome, ScoredResult};
use crate::pair::{ImagePair, Slot};
use crate::policy::MatchPolicy;
use crate::provider::{FaceAnalyzer, FaceJudge, Provider, DEFAULT_MIN_CONFIDENCE};
use crate::store::{
    ComparisonStore, SaveAck, StoredComparison, StoredImage, STATUS_MATCH, STATUS_NO_MATCH,
};
use crate::types::ImageInput;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What a pair needs before any provider is called.
enum Readiness {
    /// Nothing uploaded; outcome stays as it is.
    Untouched,
    Incomplete,
    Ready(ImageInput, ImageInput),
}

fn readiness(pair: &ImagePair) -> Readiness {
    match (pair.first.input(), pair.second.input()) {
        (Some(first), Some(second)) => Readiness::Ready(first, second),
        (None, None) => Readiness::Untouched,
        _ => Readiness::Incomplete,
    }
}

/// Applies the match policy to each populated pair.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    policy: MatchPolicy,
    min_confidence: f32,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(MatchPolicy::default(), DEFAULT_MIN_CONFIDENCE)
    }
}

impl Aggregator {
    pub fn new(policy: MatchPolicy, min_confidence: f32) -> Self {
        Self {
            policy,
            min_confidence,
        }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Compare every pair and return the updated list.
    pub async fn compare(&self, pairs: Vec<ImagePair>, provider: &Provider) -> Vec<ImagePair> {
        tracing::info!(
            provider = provider.kind(),
            pairs = pairs.len(),
            "comparison pass started"
        );
        let pairs = match provider {
            Provider::Embedded(analyzer) => self.compare_embedded(pairs, analyzer.as_ref()).await,
            Provider::Remote(judge) => self.compare_remote(pairs, judge).await,
        };
        tracing::info!(
            scored = pairs.iter().filter(|p| p.outcome.scored().is_some()).count(),
            "comparison pass finished"
        );
        pairs
    }

    /// Sequential pass: each provider call is awaited before the next starts.
    async fn compare_embedded(
        &self,
        mut pairs: Vec<ImagePair>,
        analyzer: &dyn FaceAnalyzer,
    ) -> Vec<ImagePair> {
        for pair in pairs.iter_mut() {
            let (first, second) = match readiness(pair) {
                Readiness::Untouched => continue,
                Readiness::Incomplete => {
                    tracing::debug!(pair = %pair.id, "pair incomplete");
                    pair.outcome = ComparisonOutcome::Incomplete;
                    continue;
                }
                Readiness::Ready(first, second) => (first, second),
            };
            pair.outcome = self.evaluate_embedded(&pair.id, &first, &second, analyzer).await;
            log_outcome(pair);
        }
        pairs
    }

    async fn evaluate_embedded(
        &self,
        pair_id: &str,
        first: &ImageInput,
        second: &ImageInput,
        analyzer: &dyn FaceAnalyzer,
    ) -> ComparisonOutcome {
        let first = analyzer.analyze(first, self.min_confidence).await;
        let second = analyzer.analyze(second, self.min_confidence).await;

        match (first, second) {
            (Ok(Some(a)), Ok(Some(b))) => match self.policy.score_local(&a, &b) {
                Ok(result) => ComparisonOutcome::Scored(result),
                Err(e) => {
                    tracing::warn!(pair = pair_id, error = %e, "descriptors not comparable");
                    ComparisonOutcome::ProviderError {
                        message: e.to_string(),
                    }
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(pair = pair_id, error = %e, "embedded analysis failed");
                ComparisonOutcome::ProviderError {
                    message: e.to_string(),
                }
            }
            _ => ComparisonOutcome::DetectionFailed,
        }
    }

    /// Concurrent pass: every ready pair gets its own provider request.
    async fn compare_remote(
        &self,
        mut pairs: Vec<ImagePair>,
        judge: &Arc<dyn FaceJudge>,
    ) -> Vec<ImagePair> {
        let mut tasks = JoinSet::new();
        let mut dispatched = Vec::new();

        for (index, pair) in pairs.iter_mut().enumerate() {
            match readiness(pair) {
                Readiness::Untouched => {}
                Readiness::Incomplete => {
                    tracing::debug!(pair = %pair.id, "pair incomplete");
                    pair.outcome = ComparisonOutcome::Incomplete;
                }
                Readiness::Ready(first, second) => {
                    let judge = Arc::clone(judge);
                    dispatched.push(index);
                    tasks.spawn(async move { (index, judge.judge(&first, &second).await) });
                }
            }
        }

        let mut settled = vec![false; pairs.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "remote comparison task failed");
                    continue;
                }
            };
            let pair = &mut pairs[index];
            pair.outcome = match result {
                Ok(judgment) => ComparisonOutcome::Scored(MatchPolicy::score_remote(&judgment)),
                Err(e) => {
                    tracing::warn!(pair = %pair.id, error = %e, "remote judgment failed");
                    ComparisonOutcome::ProviderError {
                        message: e.to_string(),
                    }
                }
            };
            settled[index] = true;
            log_outcome(pair);
        }

        for index in dispatched {
            if !settled[index] {
                pairs[index].outcome = ComparisonOutcome::ProviderError {
                    message: "comparison task aborted".to_string(),
                };
            }
        }
        pairs
    }

    /// Offer every scored pair to the store under `case_id`.
    ///
    /// Returns `None` when there was nothing to save or the save failed;
    /// a failed save is logged and leaves the in-memory results alone.
    pub async fn persist(
        &self,
        case_id: &str,
        pairs: &[ImagePair],
        provider_kind: &str,
        store: &dyn ComparisonStore,
    ) -> Option<SaveAck> {
        let candidates: Vec<StoredComparison> = pairs
            .iter()
            .filter_map(|pair| {
                pair.outcome
                    .scored()
                    .map(|result| to_stored(pair, result, provider_kind))
            })
            .collect();

        if candidates.is_empty() {
            tracing::debug!(case = case_id, "no scored pairs to save");
            return None;
        }

        let count = candidates.len();
        match store.save(case_id, candidates).await {
            Ok(ack) => {
                tracing::info!(case = case_id, saved = ack.saved, "comparisons saved");
                Some(ack)
            }
            Err(e) => {
                tracing::warn!(case = case_id, count, error = %e, "saving comparisons failed");
                None
            }
        }
    }
}

fn log_outcome(pair: &ImagePair) {
    match &pair.outcome {
        ComparisonOutcome::Scored(result) => tracing::info!(
            pair = %pair.id,
            similarity = result.similarity,
            matched = result.is_match,
            "pair scored"
        ),
        other => tracing::info!(pair = %pair.id, outcome = ?other, "pair not scored"),
    }
}

fn stored_image(slot: &Slot) -> Option<StoredImage> {
    slot.payload.as_ref().map(|bytes| StoredImage {
        bytes: bytes.clone(),
        filename: slot.filename.clone(),
    })
}

fn to_stored(pair: &ImagePair, result: &ScoredResult, provider_kind: &str) -> StoredComparison {
    StoredComparison {
        pair_id: pair.id.clone(),
        first_image: stored_image(&pair.first),
        second_image: stored_image(&pair.second),
        similarity: result.similarity,
        match_status: if result.is_match {
            STATUS_MATCH
        } else {
            STATUS_NO_MATCH
        }
        .to_string(),
        confidence: result.confidence,
        distance: result.distance,
        details: serde_json::json!({
            "title": pair.title,
            "provider": provider_kind,
            "reasoning": result.reasoning,
        }),
        created_at: Utc::now(),
    }
}
