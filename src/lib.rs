//! ml-monitor - Inference and Feedback Recording Library
//!
//! Records model inferences and the human feedback attached to them:
//! - `InferenceStore` / `FeedbackStore` over SQLite or memory
//! - `FeedbackLedger` keeping each inference's `has_feedback` flag in step
//! - JSON HTTP API built on axum
//!
//! # Example
//!
//! ```ignore
//! use ml_monitor::store::{FeedbackLedger, InferenceStore, SqliteDatabase};
//! use ml_monitor::types::{NewFeedback, NewInference};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = SqliteDatabase::open("monitor.db").await?;
//!     let inference = db
//!         .inference_store()
//!         .insert(NewInference::generate("model", "1.0", json!({}), json!({})))
//!         .await?;
//!     db.ledger()
//!         .record_feedback(NewFeedback::generate(&inference.id, json!({"ok": true})))
//!         .await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod config;
pub mod store;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{Feedback, Inference, NewFeedback, NewInference};

pub use config::{Config, FeedbackWriteMode};

pub use store::{
    FeedbackLedger,
    FeedbackStore,
    InferenceStore,
    MemoryDatabase,
    SqliteDatabase,
    StoreError,
    StoreResult,
};

pub use server::{
    router,
    ServerState,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Inference and Feedback Recording Library", NAME, VERSION)
}
