//! HTTP handlers for inferences and feedback

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::FeedbackWriteMode;
use crate::server::error::{ApiError, ApiResult};
use crate::server::ServerState;
use crate::store::{FeedbackLedger, FeedbackStore, InferenceStore, StoreResult};
use crate::types::{Feedback, Inference, NewFeedback, NewInference};

/// Body of `POST /inferences`
#[derive(Debug, Deserialize)]
pub struct CreateInferenceRequest {
    pub model_name: String,
    pub model_version: String,
    #[serde(default)]
    pub input_data: Value,
    #[serde(default)]
    pub output_data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInferenceResponse {
    pub inference_id: String,
}

/// Body of `POST /inferences/{id}/feedback`
#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    #[serde(default)]
    pub feedback_data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFeedbackResponse {
    pub feedback_id: String,
}

/// Decode a JSON body regardless of the declared content type
fn decode<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("Invalid JSON: {}", e)))
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(err.to_string())
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn create_inference_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: CreateInferenceRequest = decode(&body)?;

    let new = NewInference::generate(req.model_name, req.model_version, req.input_data, req.output_data);
    let inference = state.inferences.insert(new).await.map_err(internal)?;

    info!("Created inference {} ({} {})", inference.id, inference.model_name, inference.model_version);
    Ok((
        StatusCode::CREATED,
        Json(CreateInferenceResponse { inference_id: inference.id }),
    ))
}

pub async fn get_inference_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Inference>> {
    let inference = state.inferences.get_by_id(&id).await?;
    Ok(Json(inference))
}

/// Every store failure here is a 500, including an unknown inference id
pub async fn create_feedback_handler(
    State(state): State<ServerState>,
    Path(inference_id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: CreateFeedbackRequest = decode(&body)?;

    let new = NewFeedback::generate(inference_id, req.feedback_data);
    let feedback = record_feedback(&state, new).await.map_err(internal)?;

    info!("Recorded feedback {} for inference {}", feedback.id, feedback.inference_id);
    Ok((
        StatusCode::CREATED,
        Json(CreateFeedbackResponse { feedback_id: feedback.id }),
    ))
}

/// Always 200; an unknown inference id lists as empty
pub async fn list_feedback_handler(
    State(state): State<ServerState>,
    Path(inference_id): Path<String>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let feedback = state.feedback.list_by_inference_id(&inference_id).await?;
    Ok(Json(feedback))
}

async fn record_feedback(state: &ServerState, feedback: NewFeedback) -> StoreResult<Feedback> {
    match state.feedback_mode {
        FeedbackWriteMode::Transactional => state.ledger.record_feedback(feedback).await,
        FeedbackWriteMode::Sequential => {
            let record = state.feedback.insert(feedback).await?;

            // Not rolled back: the feedback row stays until `reconcile` fixes the flag
            if let Err(e) = state.inferences.update_has_feedback(&record.inference_id, true).await {
                warn!(
                    "Feedback {} stored but inference {} not flagged ({}): {}",
                    record.id,
                    record.inference_id,
                    e.kind(),
                    e
                );
                return Err(e);
            }
            Ok(record)
        }
    }
}
