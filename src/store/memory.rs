//! In-memory inference and feedback stores
//!
//! Mirrors the SQLite stores' error kinds, including the foreign key check,
//! so the HTTP layer can be exercised without a database file. Both tables
//! sit behind one lock; each operation holds it only for its own duration.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    validate_new_feedback, validate_new_inference, FeedbackLedger, FeedbackStore, InferenceStore,
    StoreError, StoreResult, FEEDBACK, INFERENCE,
};
use crate::types::{Feedback, Inference, NewFeedback, NewInference};

#[derive(Default)]
struct Tables {
    inferences: HashMap<String, Inference>,
    /// Feedback per inference id, in insertion order
    feedback: HashMap<String, Vec<Feedback>>,
    feedback_ids: HashSet<String>,
}

impl Tables {
    fn insert_feedback(&mut self, record: Feedback) -> StoreResult<()> {
        // Same precedence as SQLite: key conflict first, then the reference
        if self.feedback_ids.contains(&record.id) {
            return Err(StoreError::conflict(FEEDBACK, &record.id));
        }
        if !self.inferences.contains_key(&record.inference_id) {
            return Err(StoreError::referential(&record.inference_id));
        }
        self.feedback_ids.insert(record.id.clone());
        self.feedback
            .entry(record.inference_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn set_has_feedback(&mut self, id: &str, value: bool) -> StoreResult<()> {
        let inference = self
            .inferences
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(INFERENCE, id))?;
        inference.has_feedback = value;
        Ok(())
    }
}

/// Shared in-memory database handle
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inference_store(&self) -> MemoryInferenceStore {
        MemoryInferenceStore::new(self.clone())
    }

    pub fn feedback_store(&self) -> MemoryFeedbackStore {
        MemoryFeedbackStore::new(self.clone())
    }

    pub fn ledger(&self) -> MemoryLedger {
        MemoryLedger::new(self.clone())
    }
}

fn store_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Clone)]
pub struct MemoryInferenceStore {
    db: MemoryDatabase,
}

impl MemoryInferenceStore {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InferenceStore for MemoryInferenceStore {
    async fn insert(&self, inference: NewInference) -> StoreResult<Inference> {
        validate_new_inference(&inference)?;

        let mut tables = self.db.tables.write().await;
        if tables.inferences.contains_key(&inference.id) {
            return Err(StoreError::conflict(INFERENCE, &inference.id));
        }

        let record = inference.into_record(store_timestamp());
        tables.inferences.insert(record.id.clone(), record.clone());
        debug!("Inserted inference {}", record.id);
        Ok(record)
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Inference> {
        let tables = self.db.tables.read().await;
        tables
            .inferences
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(INFERENCE, id))
    }

    async fn update_has_feedback(&self, id: &str, value: bool) -> StoreResult<()> {
        let mut tables = self.db.tables.write().await;
        tables.set_has_feedback(id, value)
    }
}

#[derive(Clone)]
pub struct MemoryFeedbackStore {
    db: MemoryDatabase,
}

impl MemoryFeedbackStore {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn insert(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        validate_new_feedback(&feedback)?;
        let record = feedback.into_record(store_timestamp());

        let mut tables = self.db.tables.write().await;
        tables.insert_feedback(record.clone())?;
        debug!("Inserted feedback {} for inference {}", record.id, record.inference_id);
        Ok(record)
    }

    async fn list_by_inference_id(&self, inference_id: &str) -> StoreResult<Vec<Feedback>> {
        let tables = self.db.tables.read().await;
        Ok(tables.feedback.get(inference_id).cloned().unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct MemoryLedger {
    db: MemoryDatabase,
}

impl MemoryLedger {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackLedger for MemoryLedger {
    async fn record_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        validate_new_feedback(&feedback)?;
        let record = feedback.into_record(store_timestamp());

        // One write guard covers both halves
        let mut tables = self.db.tables.write().await;
        tables.insert_feedback(record.clone())?;
        tables.set_has_feedback(&record.inference_id, true)?;
        Ok(record)
    }

    async fn reconcile_feedback_flags(&self) -> StoreResult<usize> {
        let mut tables = self.db.tables.write().await;
        let Tables { inferences, feedback, .. } = &mut *tables;

        let mut changed = 0;
        for inference in inferences.values_mut() {
            let expected = feedback.get(&inference.id).is_some_and(|list| !list.is_empty());
            if inference.has_feedback != expected {
                inference.has_feedback = expected;
                changed += 1;
            }
        }

        if changed > 0 {
            warn!("Reconciled has_feedback on {} inference(s)", changed);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_returns_independent_copy() {
        let db = MemoryDatabase::new();
        let store = db.inference_store();
        store
            .insert(NewInference {
                id: "inf-1".to_string(),
                model_name: "m".to_string(),
                model_version: "1".to_string(),
                input_data: json!({}),
                output_data: json!({}),
            })
            .await
            .unwrap();

        let mut copy = store.get_by_id("inf-1").await.unwrap();
        copy.has_feedback = true;
        assert!(!store.get_by_id("inf-1").await.unwrap().has_feedback);
    }

    #[tokio::test]
    async fn test_record_feedback_checks_reference_before_writing() {
        let db = MemoryDatabase::new();

        let err = db
            .ledger()
            .record_feedback(NewFeedback::generate("missing", json!({"c": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferentialViolation { .. }));

        let tables = db.tables.read().await;
        assert!(tables.feedback_ids.is_empty());
        assert!(tables.feedback.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_feedback_id_across_inferences() {
        let db = MemoryDatabase::new();
        let inferences = db.inference_store();
        for id in ["a", "b"] {
            inferences
                .insert(NewInference {
                    id: id.to_string(),
                    model_name: "m".to_string(),
                    model_version: "1".to_string(),
                    input_data: json!(null),
                    output_data: json!(null),
                })
                .await
                .unwrap();
        }

        let feedback = db.feedback_store();
        let mut fb = NewFeedback::generate("a", json!(1));
        feedback.insert(fb.clone()).await.unwrap();

        fb.inference_id = "b".to_string();
        let err = feedback.insert(fb).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(feedback.list_by_inference_id("b").await.unwrap().is_empty());
    }
}
