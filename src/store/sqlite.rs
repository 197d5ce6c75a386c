//! SQLite-backed inference and feedback stores

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    migrations, validate_new_feedback, validate_new_inference, FeedbackLedger, FeedbackStore,
    InferenceStore, StoreError, StoreResult, FEEDBACK, INFERENCE,
};
use crate::types::{Feedback, Inference, NewFeedback, NewInference};

/// Shared database handle.
///
/// Cloning is cheap; every clone talks to the same connection. The
/// composition root opens one and hands clones to each store.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) the database file at `path` and bring the schema up to date
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // Off by default in SQLite and scoped to the connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut conn).context("Failed to run migrations")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply pending migrations, returning how many ran
    pub async fn migrate(&self) -> StoreResult<usize> {
        let mut conn = self.conn.lock().await;
        migrations::run_migrations(&mut conn)
    }

    /// Schema version currently recorded in the database
    pub async fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.conn.lock().await;
        migrations::schema_version(&conn)
    }

    pub fn inference_store(&self) -> SqliteInferenceStore {
        SqliteInferenceStore::new(self.clone())
    }

    pub fn feedback_store(&self) -> SqliteFeedbackStore {
        SqliteFeedbackStore::new(self.clone())
    }

    pub fn ledger(&self) -> SqliteLedger {
        SqliteLedger::new(self.clone())
    }
}

/// Inference store over a `SqliteDatabase`
#[derive(Clone)]
pub struct SqliteInferenceStore {
    db: SqliteDatabase,
}

impl SqliteInferenceStore {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InferenceStore for SqliteInferenceStore {
    async fn insert(&self, inference: NewInference) -> StoreResult<Inference> {
        validate_new_inference(&inference)?;
        let record = inference.into_record(store_timestamp());

        let conn = self.db.conn.lock().await;
        conn.execute(
            r#"INSERT INTO inferences
               (id, model_name, model_version, input_data, output_data, created_at, has_feedback)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                record.id,
                record.model_name,
                record.model_version,
                serde_json::to_string(&record.input_data)?,
                serde_json::to_string(&record.output_data)?,
                format_timestamp(&record.created_at),
                record.has_feedback,
            ],
        )
        .map_err(|e| match constraint_code(&e) {
            Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                StoreError::conflict(INFERENCE, &record.id)
            }
            _ => StoreError::from(e),
        })?;

        debug!("Inserted inference {}", record.id);
        Ok(record)
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Inference> {
        let conn = self.db.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, model_name, model_version, input_data, output_data, created_at, has_feedback
             FROM inferences WHERE id = ?1",
        )?;

        let inference = stmt.query_row(params![id], inference_from_row).optional()?;
        inference.ok_or_else(|| StoreError::not_found(INFERENCE, id))
    }

    async fn update_has_feedback(&self, id: &str, value: bool) -> StoreResult<()> {
        let conn = self.db.conn.lock().await;
        set_has_feedback(&conn, id, value)
    }
}

/// Feedback store over a `SqliteDatabase`
#[derive(Clone)]
pub struct SqliteFeedbackStore {
    db: SqliteDatabase,
}

impl SqliteFeedbackStore {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackStore for SqliteFeedbackStore {
    async fn insert(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        validate_new_feedback(&feedback)?;
        let record = feedback.into_record(store_timestamp());

        let conn = self.db.conn.lock().await;
        insert_feedback_row(&conn, &record)?;

        debug!("Inserted feedback {} for inference {}", record.id, record.inference_id);
        Ok(record)
    }

    async fn list_by_inference_id(&self, inference_id: &str) -> StoreResult<Vec<Feedback>> {
        let conn = self.db.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, inference_id, feedback_data, created_at
             FROM feedback
             WHERE inference_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let records = stmt
            .query_map(params![inference_id], feedback_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// Transactional writes over a `SqliteDatabase`
#[derive(Clone)]
pub struct SqliteLedger {
    db: SqliteDatabase,
}

impl SqliteLedger {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackLedger for SqliteLedger {
    async fn record_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        validate_new_feedback(&feedback)?;
        let record = feedback.into_record(store_timestamp());

        let mut conn = self.db.conn.lock().await;
        // Dropping the transaction on an early return rolls it back
        let tx = conn.transaction()?;
        insert_feedback_row(&tx, &record)?;
        set_has_feedback(&tx, &record.inference_id, true)?;
        tx.commit()?;

        debug!("Recorded feedback {} for inference {}", record.id, record.inference_id);
        Ok(record)
    }

    async fn reconcile_feedback_flags(&self) -> StoreResult<usize> {
        let conn = self.db.conn.lock().await;

        let changed = conn.execute(
            r#"UPDATE inferences
               SET has_feedback = EXISTS (SELECT 1 FROM feedback f WHERE f.inference_id = inferences.id)
               WHERE has_feedback != EXISTS (SELECT 1 FROM feedback f WHERE f.inference_id = inferences.id)"#,
            [],
        )?;

        if changed > 0 {
            warn!("Reconciled has_feedback on {} inference(s)", changed);
        }
        Ok(changed)
    }
}

fn insert_feedback_row(conn: &Connection, record: &Feedback) -> StoreResult<()> {
    conn.execute(
        r#"INSERT INTO feedback (id, inference_id, feedback_data, created_at)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![
            record.id,
            record.inference_id,
            serde_json::to_string(&record.feedback_data)?,
            format_timestamp(&record.created_at),
        ],
    )
    .map_err(|e| match constraint_code(&e) {
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::referential(&record.inference_id),
        Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
            StoreError::conflict(FEEDBACK, &record.id)
        }
        _ => StoreError::from(e),
    })?;
    Ok(())
}

/// Matches on the affected-row count rather than reading first
fn set_has_feedback(conn: &Connection, id: &str, value: bool) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE inferences SET has_feedback = ?1 WHERE id = ?2",
        params![value, id],
    )?;

    if updated == 0 {
        return Err(StoreError::not_found(INFERENCE, id));
    }
    Ok(())
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

/// Timestamps are kept at microsecond precision so a returned record equals
/// the one read back later.
fn store_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_document(idx: usize, raw: &str) -> rusqlite::Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn inference_from_row(row: &Row<'_>) -> rusqlite::Result<Inference> {
    let input_json: String = row.get(3)?;
    let output_json: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Inference {
        id: row.get(0)?,
        model_name: row.get(1)?,
        model_version: row.get(2)?,
        input_data: parse_document(3, &input_json)?,
        output_data: parse_document(4, &output_json)?,
        created_at: parse_timestamp(5, &created_at)?,
        has_feedback: row.get(6)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    let data_json: String = row.get(2)?;
    let created_at: String = row.get(3)?;

    Ok(Feedback {
        id: row.get(0)?,
        inference_id: row.get(1)?,
        feedback_data: parse_document(2, &data_json)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}
