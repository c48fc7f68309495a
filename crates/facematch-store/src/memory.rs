//! In-memory store that echoes saved data back.

use async_trait::async_trait;
use facematch_core::store::{
    CaseFilter, CaseRecord, ComparisonStore, SaveAck, StoreError, StoredComparison,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    cases: RwLock<Vec<CaseRecord>>,
    comparisons: RwLock<HashMap<String, Vec<StoredComparison>>>,
}

impl MemoryStore {
    pub fn new(cases: Vec<CaseRecord>) -> Self {
        Self {
            cases: RwLock::new(cases),
            comparisons: RwLock::default(),
        }
    }

    /// Two demo applications.
    pub fn with_demo_cases() -> Self {
        Self::new(vec![
            CaseRecord {
                id: "1".into(),
                application_number: "APP001".into(),
                applicant_name: "John Doe".into(),
            },
            CaseRecord {
                id: "2".into(),
                application_number: "APP002".into(),
                applicant_name: "Jane Smith".into(),
            },
        ])
    }
}

#[async_trait]
impl ComparisonStore for MemoryStore {
    async fn list(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StoreError> {
        let cases = self.cases.read().await;
        Ok(cases
            .iter()
            .filter(|c| filter.matches(c))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_comparisons(&self, case_id: &str) -> Result<Vec<StoredComparison>, StoreError> {
        tracing::debug!(case = case_id, "memory store: get_comparisons");
        Ok(self
            .comparisons
            .read()
            .await
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        case_id: &str,
        comparisons: Vec<StoredComparison>,
    ) -> Result<SaveAck, StoreError> {
        tracing::debug!(case = case_id, count = comparisons.len(), "memory store: save");
        let saved = comparisons.len();
        let mut all = self.comparisons.write().await;
        let existing = all.entry(case_id.to_string()).or_default();
        for comparison in comparisons {
            existing.retain(|c| c.pair_id != comparison.pair_id);
            existing.push(comparison);
        }
        Ok(SaveAck {
            success: true,
            saved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comparison(pair_id: &str, similarity: f64) -> StoredComparison {
        StoredComparison {
            pair_id: pair_id.into(),
            first_image: None,
            second_image: None,
            similarity,
            match_status: "MATCH".into(),
            confidence: None,
            distance: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_filter_and_limit() {
        let store = MemoryStore::with_demo_cases();
        assert_eq!(store.list(&CaseFilter::default()).await.unwrap().len(), 2);

        let limited = CaseFilter {
            limit: Some(1),
            query: None,
        };
        assert_eq!(store.list(&limited).await.unwrap().len(), 1);

        let query = CaseFilter {
            limit: None,
            query: Some("smith".into()),
        };
        let found = store.list(&query).await.unwrap();
        assert_eq!(found[0].application_number, "APP002");
    }

    #[tokio::test]
    async fn test_save_echoes_back_and_replaces_pairs() {
        let store = MemoryStore::with_demo_cases();
        assert!(store.get_comparisons("1").await.unwrap().is_empty());

        store
            .save("1", vec![comparison("kyc-kyc", 50.0), comparison("kyc-rtp", 60.0)])
            .await
            .unwrap();
        let ack = store
            .save("1", vec![comparison("kyc-kyc", 75.0)])
            .await
            .unwrap();
        assert!(ack.success);

        let saved = store.get_comparisons("1").await.unwrap();
        assert_eq!(saved.len(), 2);
        let kyc = saved.iter().find(|c| c.pair_id == "kyc-kyc").unwrap();
        assert_eq!(kyc.similarity, 75.0);
    }
}
