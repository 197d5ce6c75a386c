//! ml-monitor - Inference and Feedback Recorder
//!
//! Stores model inferences and user feedback behind a small HTTP API.

use ml_monitor::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO level by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    cli::run().await
}
