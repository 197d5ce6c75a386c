//! HTTP API server
//!
//! Routes:
//! - `GET  /health`
//! - `POST /inferences`
//! - `GET  /inferences/{id}`
//! - `POST /inferences/{id}/feedback`
//! - `GET  /inferences/{id}/feedback`

pub mod error;
pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::FeedbackWriteMode;
use crate::store::{FeedbackLedger, FeedbackStore, InferenceStore, MemoryDatabase, SqliteDatabase};

/// Shared server state.
///
/// Holds the stores as trait objects so the same router serves SQLite,
/// memory, or test doubles.
#[derive(Clone)]
pub struct ServerState {
    pub inferences: Arc<dyn InferenceStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub ledger: Arc<dyn FeedbackLedger>,
    pub feedback_mode: FeedbackWriteMode,
}

impl ServerState {
    pub fn new(
        inferences: Arc<dyn InferenceStore>,
        feedback: Arc<dyn FeedbackStore>,
        ledger: Arc<dyn FeedbackLedger>,
        feedback_mode: FeedbackWriteMode,
    ) -> Self {
        Self {
            inferences,
            feedback,
            ledger,
            feedback_mode,
        }
    }

    /// Stores backed by one SQLite handle
    pub fn sqlite(db: &SqliteDatabase, feedback_mode: FeedbackWriteMode) -> Self {
        Self::new(
            Arc::new(db.inference_store()),
            Arc::new(db.feedback_store()),
            Arc::new(db.ledger()),
            feedback_mode,
        )
    }

    /// Stores backed by one in-memory handle
    pub fn in_memory(db: &MemoryDatabase, feedback_mode: FeedbackWriteMode) -> Self {
        Self::new(
            Arc::new(db.inference_store()),
            Arc::new(db.feedback_store()),
            Arc::new(db.ledger()),
            feedback_mode,
        )
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(http::health_handler))
        .route("/inferences", post(http::create_inference_handler))
        .route("/inferences/{id}", get(http::get_inference_handler))
        .route(
            "/inferences/{id}/feedback",
            post(http::create_feedback_handler).get(http::list_feedback_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until Ctrl-C
pub async fn start(host: &str, port: u16, state: ServerState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Could not listen on {}:{}", host, port))?;

    info!(
        "Listening on http://{} (feedback writes: {})",
        listener.local_addr()?,
        state.feedback_mode
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down server...");
}
