//! SQLite-backed case store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use facematch_core::store::{
    CaseFilter, CaseRecord, ComparisonStore, SaveAck, StoreError, StoredComparison, StoredImage,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cases (
    id                 TEXT PRIMARY KEY,
    application_number TEXT NOT NULL UNIQUE,
    applicant_name     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS comparisons (
    id              TEXT PRIMARY KEY,
    case_id         TEXT NOT NULL REFERENCES cases(id),
    pair_id         TEXT NOT NULL,
    first_image     BLOB,
    first_filename  TEXT,
    second_image    BLOB,
    second_filename TEXT,
    similarity      REAL NOT NULL,
    match_status    TEXT NOT NULL,
    confidence      REAL,
    distance        REAL,
    details         TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE (case_id, pair_id)
);
";

fn backend(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Row as read from SQLite, before timestamp and JSON parsing.
struct RawComparison {
    pair_id: String,
    first_image: Option<Vec<u8>>,
    first_filename: Option<String>,
    second_image: Option<Vec<u8>>,
    second_filename: Option<String>,
    similarity: f64,
    match_status: String,
    confidence: Option<f64>,
    distance: Option<f64>,
    details: String,
    created_at: String,
}

impl RawComparison {
    fn into_stored(self) -> Result<StoredComparison, StoreError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::Malformed(format!("created_at: {e}")))?
            .with_timezone(&Utc);
        let details = serde_json::from_str(&self.details)
            .map_err(|e| StoreError::Malformed(format!("details: {e}")))?;
        let image = |bytes: Option<Vec<u8>>, filename| {
            bytes.map(|bytes| StoredImage { bytes, filename })
        };

        Ok(StoredComparison {
            pair_id: self.pair_id,
            first_image: image(self.first_image, self.first_filename),
            second_image: image(self.second_image, self.second_filename),
            similarity: self.similarity,
            match_status: self.match_status,
            confidence: self.confidence,
            distance: self.distance,
            details,
            created_at,
        })
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).await.map_err(backend)?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(backend)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(backend)?;
        Ok(Self { conn })
    }

    /// Register an application, returning its case record. Re-registering an
    /// application number returns the existing record.
    pub async fn create_case(
        &self,
        application_number: &str,
        applicant_name: &str,
    ) -> Result<CaseRecord, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let number = application_number.to_string();
        let name = applicant_name.to_string();

        let record = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO cases (id, application_number, applicant_name)
                     VALUES (?1, ?2, ?3)",
                    params![id, number, name],
                )?;
                let record = conn.query_row(
                    "SELECT id, application_number, applicant_name FROM cases
                     WHERE application_number = ?1",
                    params![number],
                    |row| {
                        Ok(CaseRecord {
                            id: row.get(0)?,
                            application_number: row.get(1)?,
                            applicant_name: row.get(2)?,
                        })
                    },
                )?;
                Ok(record)
            })
            .await
            .map_err(backend)?;

        tracing::info!(case = %record.id, number = %record.application_number, "case registered");
        Ok(record)
    }

    async fn case_exists(&self, case_id: &str) -> Result<bool, StoreError> {
        let id = case_id.to_string();
        self.conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT 1 FROM cases WHERE id = ?1", params![id], |_| Ok(()))
                    .optional()?
                    .is_some())
            })
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl ComparisonStore for SqliteStore {
    async fn list(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StoreError> {
        // Matching goes through `CaseFilter::matches` so a query is always a
        // literal substring, never a LIKE pattern.
        let cases = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, application_number, applicant_name FROM cases
                     ORDER BY application_number",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(CaseRecord {
                            id: row.get(0)?,
                            application_number: row.get(1)?,
                            applicant_name: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend)?;

        Ok(cases
            .into_iter()
            .filter(|c| filter.matches(c))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_comparisons(&self, case_id: &str) -> Result<Vec<StoredComparison>, StoreError> {
        if !self.case_exists(case_id).await? {
            return Err(StoreError::UnknownCase(case_id.to_string()));
        }

        let id = case_id.to_string();
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT pair_id, first_image, first_filename, second_image, second_filename,
                            similarity, match_status, confidence, distance, details, created_at
                     FROM comparisons WHERE case_id = ?1 ORDER BY pair_id",
                )?;
                let rows = stmt
                    .query_map(params![id], |row| {
                        Ok(RawComparison {
                            pair_id: row.get(0)?,
                            first_image: row.get(1)?,
                            first_filename: row.get(2)?,
                            second_image: row.get(3)?,
                            second_filename: row.get(4)?,
                            similarity: row.get(5)?,
                            match_status: row.get(6)?,
                            confidence: row.get(7)?,
                            distance: row.get(8)?,
                            details: row.get(9)?,
                            created_at: row.get(10)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend)?;

        raw.into_iter().map(RawComparison::into_stored).collect()
    }

    async fn save(
        &self,
        case_id: &str,
        comparisons: Vec<StoredComparison>,
    ) -> Result<SaveAck, StoreError> {
        if !self.case_exists(case_id).await? {
            return Err(StoreError::UnknownCase(case_id.to_string()));
        }

        let id = case_id.to_string();
        let saved = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO comparisons (
                             id, case_id, pair_id, first_image, first_filename,
                             second_image, second_filename, similarity, match_status,
                             confidence, distance, details, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                         ON CONFLICT (case_id, pair_id) DO UPDATE SET
                             first_image = excluded.first_image,
                             first_filename = excluded.first_filename,
                             second_image = excluded.second_image,
                             second_filename = excluded.second_filename,
                             similarity = excluded.similarity,
                             match_status = excluded.match_status,
                             confidence = excluded.confidence,
                             distance = excluded.distance,
                             details = excluded.details,
                             created_at = excluded.created_at",
                    )?;
                    for c in &comparisons {
                        let (first_image, first_filename) = split_image(c.first_image.as_ref());
                        let (second_image, second_filename) = split_image(c.second_image.as_ref());
                        stmt.execute(params![
                            uuid::Uuid::new_v4().to_string(),
                            id,
                            c.pair_id,
                            first_image,
                            first_filename,
                            second_image,
                            second_filename,
                            c.similarity,
                            c.match_status,
                            c.confidence,
                            c.distance,
                            c.details.to_string(),
                            c.created_at.to_rfc3339(),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(comparisons.len())
            })
            .await
            .map_err(backend)?;

        tracing::debug!(case = case_id, saved, "sqlite store: comparisons saved");
        Ok(SaveAck {
            success: true,
            saved,
        })
    }
}

fn split_image(image: Option<&StoredImage>) -> (Option<&[u8]>, Option<&str>) {
    match image {
        Some(img) => (Some(img.bytes.as_slice()), img.filename.as_deref()),
        None => (None, None),
    }
}
