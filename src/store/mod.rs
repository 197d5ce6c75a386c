//! Persistence layer for inferences and their feedback
//!
//! Provides:
//! - `InferenceStore` / `FeedbackStore` capability traits
//! - `FeedbackLedger` for writes that must touch both tables at once
//! - SQLite implementations sharing one explicit `SqliteDatabase` handle
//! - In-memory implementations sharing one `MemoryDatabase` handle
//!
//! Both families report the same `StoreError` kinds for the same situations,
//! so anything tested against memory holds against SQLite.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use async_trait::async_trait;

use crate::types::{Feedback, Inference, NewFeedback, NewInference};

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryDatabase, MemoryFeedbackStore, MemoryInferenceStore, MemoryLedger};
pub use migrations::{run_migrations, schema_version, MIGRATIONS};
pub use sqlite::{SqliteDatabase, SqliteFeedbackStore, SqliteInferenceStore, SqliteLedger};

pub(crate) const INFERENCE: &str = "inference";
pub(crate) const FEEDBACK: &str = "feedback";

/// Inference records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceStore: Send + Sync {
    /// Persist a new inference with `has_feedback = false`.
    ///
    /// Fails with `Conflict` if the id exists; the existing record is left untouched.
    async fn insert(&self, inference: NewInference) -> StoreResult<Inference>;

    /// Fetch one inference, `NotFound` if absent
    async fn get_by_id(&self, id: &str) -> StoreResult<Inference>;

    /// Set the feedback flag, `NotFound` if no record matched
    async fn update_has_feedback(&self, id: &str, value: bool) -> StoreResult<()>;
}

/// Feedback records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist a feedback record.
    ///
    /// Fails with `ReferentialViolation` when `inference_id` is unknown and
    /// `Conflict` when the id is taken. Does not touch the inference's flag.
    async fn insert(&self, feedback: NewFeedback) -> StoreResult<Feedback>;

    /// All feedback for an inference in insertion order.
    ///
    /// An unknown inference id yields an empty list, same as an inference
    /// without feedback.
    async fn list_by_inference_id(&self, inference_id: &str) -> StoreResult<Vec<Feedback>>;
}

/// Writes spanning both tables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackLedger: Send + Sync {
    /// Insert feedback and flag its inference as one atomic unit
    async fn record_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback>;

    /// Recompute every `has_feedback` flag from feedback existence.
    ///
    /// Returns how many inferences changed.
    async fn reconcile_feedback_flags(&self) -> StoreResult<usize>;
}

pub(crate) fn validate_new_inference(inference: &NewInference) -> StoreResult<()> {
    if inference.id.trim().is_empty() {
        return Err(StoreError::validation("inference id must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_new_feedback(feedback: &NewFeedback) -> StoreResult<()> {
    if feedback.id.trim().is_empty() {
        return Err(StoreError::validation("feedback id must not be empty"));
    }
    if feedback.inference_id.trim().is_empty() {
        return Err(StoreError::validation("feedback inference_id must not be empty"));
    }
    Ok(())
}
