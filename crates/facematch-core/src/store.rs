//! Persistence collaborator: cases and their saved comparisons.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATUS_MATCH: &str = "MATCH";
pub const STATUS_NO_MATCH: &str = "NO MATCH";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown case: {0}")]
    UnknownCase(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("stored record is malformed: {0}")]
    Malformed(String),
}

/// An application whose photos are being verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub application_number: String,
    pub applicant_name: String,
}

/// Filter for [`ComparisonStore::list`].
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub limit: Option<usize>,
    /// Case-insensitive substring over application number and applicant name.
    pub query: Option<String>,
}

impl CaseFilter {
    pub fn matches(&self, case: &CaseRecord) -> bool {
        match &self.query {
            None => true,
            Some(q) => {
                let q = q.to_lowercase();
                case.application_number.to_lowercase().contains(&q)
                    || case.applicant_name.to_lowercase().contains(&q)
            }
        }
    }
}

/// Encoded image kept alongside a saved comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

/// One saved pair result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredComparison {
    pub pair_id: String,
    pub first_image: Option<StoredImage>,
    pub second_image: Option<StoredImage>,
    pub similarity: f64,
    /// `MATCH` or `NO MATCH`.
    pub match_status: String,
    pub confidence: Option<f64>,
    pub distance: Option<f64>,
    /// Free-form detail blob (provider, reasoning, ...).
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl StoredComparison {
    pub fn is_match(&self) -> bool {
        self.match_status == STATUS_MATCH
    }
}

/// Acknowledgement of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    pub success: bool,
    pub saved: usize,
}

#[async_trait]
pub trait ComparisonStore: Send + Sync {
    async fn list(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StoreError>;

    async fn get_comparisons(&self, case_id: &str) -> Result<Vec<StoredComparison>, StoreError>;

    /// Store comparisons for a case, replacing earlier results for the same pairs.
    async fn save(
        &self,
        case_id: &str,
        comparisons: Vec<StoredComparison>,
    ) -> Result<SaveAck, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(number: &str, name: &str) -> CaseRecord {
        CaseRecord {
            id: "1".into(),
            application_number: number.into(),
            applicant_name: name.into(),
        }
    }

    #[test]
    fn test_filter_without_query_matches_all() {
        assert!(CaseFilter::default().matches(&case("APP001", "John Doe")));
    }

    #[test]
    fn test_filter_query_is_case_insensitive() {
        let filter = CaseFilter {
            limit: None,
            query: Some("jane".into()),
        };
        assert!(filter.matches(&case("APP002", "Jane Smith")));
        assert!(!filter.matches(&case("APP001", "John Doe")));

        let filter = CaseFilter {
            limit: None,
            query: Some("app001".into()),
        };
        assert!(filter.matches(&case("APP001", "John Doe")));
    }
}
