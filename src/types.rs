//! Records shared by the store and the HTTP layer
//!
//! `Inference` and `Feedback` are the persisted shapes. The `New*` types are
//! what callers hand to a store: they carry no timestamps and no feedback
//! flag, since the store owns those fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded model prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub id: String,
    pub model_name: String,
    pub model_version: String,
    /// Model input, stored verbatim
    pub input_data: Value,
    /// Model output, stored verbatim
    pub output_data: Value,
    pub created_at: DateTime<Utc>,
    /// True once at least one feedback record references this inference
    pub has_feedback: bool,
}

/// Insertion input for an inference
#[derive(Debug, Clone, PartialEq)]
pub struct NewInference {
    pub id: String,
    pub model_name: String,
    pub model_version: String,
    pub input_data: Value,
    pub output_data: Value,
}

impl NewInference {
    /// Build an inference with a fresh v4 id
    pub fn generate(
        model_name: impl Into<String>,
        model_version: impl Into<String>,
        input_data: Value,
        output_data: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model_name: model_name.into(),
            model_version: model_version.into(),
            input_data,
            output_data,
        }
    }

    /// Materialize the stored record
    pub(crate) fn into_record(self, created_at: DateTime<Utc>) -> Inference {
        Inference {
            id: self.id,
            model_name: self.model_name,
            model_version: self.model_version,
            input_data: self.input_data,
            output_data: self.output_data,
            created_at,
            has_feedback: false,
        }
    }
}

/// A human correction or annotation attached to one inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub inference_id: String,
    pub feedback_data: Value,
    pub created_at: DateTime<Utc>,
}

/// Insertion input for a feedback record
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub id: String,
    pub inference_id: String,
    pub feedback_data: Value,
}

impl NewFeedback {
    /// Build a feedback record with a fresh v4 id
    pub fn generate(inference_id: impl Into<String>, feedback_data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            inference_id: inference_id.into(),
            feedback_data,
        }
    }

    pub(crate) fn into_record(self, created_at: DateTime<Utc>) -> Feedback {
        Feedback {
            id: self.id,
            inference_id: self.inference_id,
            feedback_data: self.feedback_data,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_inference_starts_unflagged() {
        let new = NewInference::generate("m", "1", json!({"x": 1}), json!({}));
        let now = Utc::now();
        let record = new.clone().into_record(now);

        assert_eq!(record.id, new.id);
        assert_eq!(record.created_at, now);
        assert!(!record.has_feedback);
        assert_eq!(record.input_data, json!({"x": 1}));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = NewFeedback::generate("inf", Value::Null);
        let b = NewFeedback::generate("inf", Value::Null);
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_inference_json_field_names() {
        let record = NewInference::generate("m", "1", json!({}), json!({})).into_record(Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        for field in ["id", "model_name", "model_version", "input_data", "output_data", "created_at", "has_feedback"] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["has_feedback"], json!(false));
    }
}
