//! A comparison session: the pair list, optionally bound to a case.

use crate::aggregator::Aggregator;
use crate::outcome::{ComparisonOutcome, ScoredResult};
use crate::pair::{ImagePair, SessionError, SlotPosition};
use crate::provider::Provider;
use crate::report::Report;
use crate::store::{ComparisonStore, SaveAck, StoreError, StoredComparison, StoredImage};

/// The standard verification layout: `(id, title, first label, second label)`.
pub const DEFAULT_LAYOUT: [(&str, &str, &str, &str); 4] = [
    (
        "rtp-portal",
        "RTP (Real Time Photo) vs Portal(IC)",
        "Upload RTP",
        "Upload Portal(IC)",
    ),
    ("kyc-kyc", "KYC vs KYC", "Upload KYC", "Upload KYC"),
    (
        "kyc-rtp",
        "KYC vs RTP (Real Time Photo)",
        "Upload KYC",
        "Upload RTP",
    ),
    (
        "kyc-portal",
        "KYC vs Portal(IC)",
        "Upload KYC",
        "Upload Portal(IC)",
    ),
];

pub fn default_pairs() -> Vec<ImagePair> {
    DEFAULT_LAYOUT
        .iter()
        .map(|(id, title, first, second)| ImagePair::new(*id, *title, *first, *second))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Session {
    case_id: Option<String>,
    pairs: Vec<ImagePair>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(default_pairs())
    }
}

impl Session {
    pub fn new(pairs: Vec<ImagePair>) -> Self {
        Self {
            case_id: None,
            pairs,
        }
    }

    pub fn with_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    pub fn pairs(&self) -> &[ImagePair] {
        &self.pairs
    }

    pub fn pair(&self, pair_id: &str) -> Option<&ImagePair> {
        self.pairs.iter().find(|p| p.id == pair_id)
    }

    fn pair_mut(&mut self, pair_id: &str) -> Result<&mut ImagePair, SessionError> {
        self.pairs
            .iter_mut()
            .find(|p| p.id == pair_id)
            .ok_or_else(|| SessionError::UnknownPair(pair_id.to_string()))
    }

    /// Load an image into one slot of a pair, resetting that pair to `Pending`.
    pub fn upload(
        &mut self,
        pair_id: &str,
        position: SlotPosition,
        bytes: Vec<u8>,
        filename: Option<String>,
    ) -> Result<(), SessionError> {
        self.pair_mut(pair_id)?.upload(position, bytes, filename)?;
        tracing::debug!(pair = pair_id, ?position, "image uploaded");
        Ok(())
    }

    pub fn reset_pair(&mut self, pair_id: &str) -> Result<(), SessionError> {
        self.pair_mut(pair_id)?.reset();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for pair in &mut self.pairs {
            pair.reset();
        }
    }

    /// Run one comparison pass. When the session has a case and a store is
    /// given, pairs scored in this pass are saved afterwards.
    ///
    /// Pairs that are already `Scored` (restored from a case, or scored by an
    /// earlier pass) keep their result and are not sent to the provider; an
    /// upload or reset is what invalidates a score.
    pub async fn compare(
        &mut self,
        aggregator: &Aggregator,
        provider: &Provider,
        store: Option<&dyn ComparisonStore>,
    ) -> Option<SaveAck> {
        let mut kept: Vec<Option<ImagePair>> = Vec::with_capacity(self.pairs.len());
        let mut positions = Vec::new();
        let mut stale = Vec::new();
        for (index, pair) in std::mem::take(&mut self.pairs).into_iter().enumerate() {
            if pair.outcome.scored().is_some() {
                kept.push(Some(pair));
            } else {
                kept.push(None);
                positions.push(index);
                stale.push(pair);
            }
        }
        tracing::debug!(
            kept = kept.len() - positions.len(),
            comparing = positions.len(),
            "scored pairs carried over"
        );

        let compared = aggregator.compare(stale, provider).await;
        let ack = match (self.case_id.as_deref(), store) {
            (Some(case_id), Some(store)) => {
                aggregator
                    .persist(case_id, &compared, provider.kind(), store)
                    .await
            }
            _ => None,
        };

        for (index, pair) in positions.into_iter().zip(compared) {
            kept[index] = Some(pair);
        }
        self.pairs = kept.into_iter().flatten().collect();
        ack
    }

    /// Rebuild a session from a case's saved comparisons without calling any
    /// provider.
    pub async fn load_case(
        store: &dyn ComparisonStore,
        case_id: &str,
        pairs: Vec<ImagePair>,
    ) -> Result<Self, StoreError> {
        let records = store.get_comparisons(case_id).await?;
        tracing::info!(case = case_id, records = records.len(), "loaded prior comparisons");
        let mut session = Self::new(pairs).with_case(case_id);
        session.restore(&records);
        Ok(session)
    }

    /// Apply saved comparisons to matching pairs. Records for pairs that are
    /// not part of this layout are skipped.
    ///
    /// A record whose images are missing or unreadable still restores its
    /// score, with the affected slots left empty. Such a pair is shown as
    /// scored but is never saved again unless both images are re-uploaded.
    pub fn restore(&mut self, records: &[StoredComparison]) {
        for record in records {
            let Some(pair) = self.pairs.iter_mut().find(|p| p.id == record.pair_id) else {
                tracing::warn!(pair = %record.pair_id, "saved comparison for unknown pair");
                continue;
            };

            pair.reset();
            restore_slot(pair, SlotPosition::First, record.first_image.as_ref());
            restore_slot(pair, SlotPosition::Second, record.second_image.as_ref());
            if !pair.is_complete() {
                tracing::warn!(
                    pair = %pair.id,
                    populated = pair.populated_slots(),
                    "saved comparison restored without both images"
                );
            }

            pair.outcome = ComparisonOutcome::Scored(ScoredResult {
                similarity: record.similarity.clamp(0.0, 100.0),
                is_match: record.is_match(),
                confidence: record.confidence,
                distance: record.distance,
                reasoning: record
                    .details
                    .get("reasoning")
                    .and_then(|r| r.as_str())
                    .map(str::to_string),
            });
        }
    }

    pub fn report(&self) -> Report {
        Report::from_pairs(self.case_id.clone(), &self.pairs)
    }
}

fn restore_slot(pair: &mut ImagePair, position: SlotPosition, image: Option<&StoredImage>) {
    let Some(image) = image else {
        return;
    };
    if let Err(e) = pair
        .slot_mut(position)
        .load(image.bytes.clone(), image.filename.clone())
    {
        tracing::warn!(pair = %pair.id, ?position, error = %e, "saved image unreadable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::test_images::png;
    use crate::provider::{AnalyzerError, FaceAnalyzer};
    use crate::store::{CaseFilter, CaseRecord, STATUS_MATCH};
    use crate::types::{Descriptor, FaceAnalysis, ImageInput};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Serves fixed records and keeps whatever is saved.
    struct FixedStore {
        records: Vec<StoredComparison>,
        saved: Mutex<Vec<StoredComparison>>,
    }

    impl FixedStore {
        fn new(records: Vec<StoredComparison>) -> Self {
            Self {
                records,
                saved: Mutex::new(Vec::new()),
            }
        }

        fn saved_pairs(&self) -> Vec<String> {
            let saved = self.saved.lock().unwrap();
            saved.iter().map(|c| c.pair_id.clone()).collect()
        }
    }

    #[async_trait]
    impl ComparisonStore for FixedStore {
        async fn list(&self, _: &CaseFilter) -> Result<Vec<CaseRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_comparisons(&self, _: &str) -> Result<Vec<StoredComparison>, StoreError> {
            Ok(self.records.clone())
        }

        async fn save(
            &self,
            _: &str,
            comparisons: Vec<StoredComparison>,
        ) -> Result<SaveAck, StoreError> {
            let saved = comparisons.len();
            self.saved.lock().unwrap().extend(comparisons);
            Ok(SaveAck {
                success: true,
                saved,
            })
        }
    }

    /// Finds the same face in every image and counts calls.
    #[derive(Default)]
    struct CountingAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FaceAnalyzer for CountingAnalyzer {
        async fn analyze(
            &self,
            _: &ImageInput,
            _: f32,
        ) -> Result<Option<FaceAnalysis>, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(FaceAnalysis {
                descriptor: Descriptor::new(vec![0.0, 1.0]),
                confidence: 0.9,
            }))
        }
    }

    fn record(pair_id: &str, status: &str) -> StoredComparison {
        StoredComparison {
            pair_id: pair_id.into(),
            first_image: Some(StoredImage {
                bytes: png(5, 5),
                filename: Some("kyc1.png".into()),
            }),
            second_image: Some(StoredImage {
                bytes: png(6, 6),
                filename: Some("kyc2.png".into()),
            }),
            similarity: 82.5,
            match_status: status.into(),
            confidence: Some(97.1),
            distance: Some(0.175),
            details: serde_json::json!({ "provider": "embedded" }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_layout() {
        let session = Session::default();
        let ids: Vec<&str> = session.pairs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["rtp-portal", "kyc-kyc", "kyc-rtp", "kyc-portal"]);
        assert!(session.pairs().iter().all(|p| p.outcome.is_pending()));
        assert_eq!(session.case_id(), None);
    }

    #[test]
    fn test_upload_unknown_pair() {
        let mut session = Session::default();
        let err = session
            .upload("selfie-passport", SlotPosition::First, png(2, 2), None)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownPair(_)));
    }

    #[test]
    fn test_reset_all() {
        let mut session = Session::default();
        session
            .upload("kyc-kyc", SlotPosition::First, png(2, 2), None)
            .unwrap();
        session
            .upload("kyc-portal", SlotPosition::Second, png(2, 2), None)
            .unwrap();
        session.reset_all();
        assert!(session.pairs().iter().all(|p| p.populated_slots() == 0));
    }

    #[tokio::test]
    async fn test_load_case_restores_scored_without_provider() {
        let store = FixedStore::new(vec![record("kyc-kyc", STATUS_MATCH)]);
        let session = Session::load_case(&store, "APP001", default_pairs())
            .await
            .unwrap();

        assert_eq!(session.case_id(), Some("APP001"));
        let pair = session.pair("kyc-kyc").unwrap();
        let result = pair.outcome.scored().unwrap();
        assert!(result.is_match);
        assert_eq!(result.similarity, 82.5);
        assert_eq!(result.confidence, Some(97.1));
        assert!(pair.is_complete());
        assert_eq!(pair.first.filename.as_deref(), Some("kyc1.png"));

        // untouched pairs stay pending
        assert!(session.pair("rtp-portal").unwrap().outcome.is_pending());
    }

    #[test]
    fn test_restore_no_match_and_unknown_pair() {
        let mut session = Session::default();
        session.restore(&[record("kyc-rtp", "NO MATCH"), record("legacy", STATUS_MATCH)]);
        assert!(!session.pair("kyc-rtp").unwrap().outcome.scored().unwrap().is_match);
        assert_eq!(session.pairs().len(), 4);
    }

    #[test]
    fn test_restore_then_upload_resets() {
        let mut session = Session::default();
        session.restore(&[record("kyc-kyc", STATUS_MATCH)]);
        session
            .upload("kyc-kyc", SlotPosition::First, png(7, 7), None)
            .unwrap();
        assert!(session.pair("kyc-kyc").unwrap().outcome.is_pending());
    }

    #[tokio::test]
    async fn test_compare_keeps_restored_pairs_and_saves_only_new_scores() {
        let store = FixedStore::new(vec![record("kyc-kyc", STATUS_MATCH)]);
        let mut session = Session::load_case(&store, "APP001", default_pairs())
            .await
            .unwrap();
        session
            .upload("kyc-rtp", SlotPosition::First, png(3, 3), None)
            .unwrap();
        session
            .upload("kyc-rtp", SlotPosition::Second, png(4, 4), None)
            .unwrap();

        let analyzer = Arc::new(CountingAnalyzer::default());
        let provider = Provider::Embedded(analyzer.clone());
        let ack = session
            .compare(&Aggregator::default(), &provider, Some(&store))
            .await
            .unwrap();

        // only the two kyc-rtp images reach the provider
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ack.saved, 1);
        assert_eq!(store.saved_pairs(), ["kyc-rtp"]);

        let restored = session.pair("kyc-kyc").unwrap().outcome.scored().unwrap();
        assert_eq!(restored.similarity, 82.5);
        assert!(session.pair("kyc-rtp").unwrap().outcome.scored().is_some());
        let ids: Vec<&str> = session.pairs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["rtp-portal", "kyc-kyc", "kyc-rtp", "kyc-portal"]);
    }

    #[tokio::test]
    async fn test_restore_without_images_is_scored_but_never_resaved() {
        let mut bare = record("kyc-portal", STATUS_MATCH);
        bare.first_image = None;
        bare.second_image = None;
        let store = FixedStore::new(vec![bare]);
        let mut session = Session::load_case(&store, "APP001", default_pairs())
            .await
            .unwrap();

        let pair = session.pair("kyc-portal").unwrap();
        assert_eq!(pair.populated_slots(), 0);
        assert!(pair.outcome.scored().is_some());

        let analyzer = Arc::new(CountingAnalyzer::default());
        let ack = session
            .compare(
                &Aggregator::default(),
                &Provider::Embedded(analyzer.clone()),
                Some(&store),
            )
            .await;
        assert!(ack.is_none());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert!(store.saved_pairs().is_empty());
        assert!(session.pair("kyc-portal").unwrap().outcome.scored().is_some());
    }

    #[tokio::test]
    async fn test_reupload_after_restore_rescores() {
        let store = FixedStore::new(vec![record("kyc-kyc", STATUS_MATCH)]);
        let mut session = Session::load_case(&store, "APP001", default_pairs())
            .await
            .unwrap();
        session
            .upload("kyc-kyc", SlotPosition::Second, png(9, 9), None)
            .unwrap();

        let analyzer = Arc::new(CountingAnalyzer::default());
        session
            .compare(
                &Aggregator::default(),
                &Provider::Embedded(analyzer.clone()),
                Some(&store),
            )
            .await;

        // restored first image plus the new second one
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        let rescored = session.pair("kyc-kyc").unwrap().outcome.scored().unwrap();
        assert_eq!(rescored.similarity, 100.0);
        assert_eq!(store.saved_pairs(), ["kyc-kyc"]);
    }
}
