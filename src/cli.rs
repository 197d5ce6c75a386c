//! CLI interface for ml-monitor

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::config::{Config, FeedbackWriteMode};
use crate::server::ServerState;
use crate::store::{FeedbackLedger, FeedbackStore, InferenceStore, MemoryDatabase, SqliteDatabase};
use crate::types::{NewFeedback, NewInference};

#[derive(Parser)]
#[command(name = "ml-monitor")]
#[command(about = "Record model inferences and the human feedback attached to them", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "ML_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep everything in memory instead of the database file
        #[arg(long)]
        in_memory: bool,
        /// Feedback write mode: transactional or sequential
        #[arg(long)]
        feedback_mode: Option<FeedbackWriteMode>,
    },
    /// Apply pending schema migrations
    Migrate,
    /// Recompute every inference's has_feedback flag from stored feedback
    Reconcile,
    /// Insert a sample inference with feedback and print both back
    Demo {
        /// Use a throwaway in-memory store
        #[arg(long)]
        in_memory: bool,
    },
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port, in_memory, feedback_mode } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mode) = feedback_mode {
                config.feedback.write_mode = mode;
            }

            let state = if in_memory {
                println!("Using in-memory store; data is lost on exit");
                ServerState::in_memory(&MemoryDatabase::new(), config.feedback.write_mode)
            } else {
                let db = SqliteDatabase::open(&config.database.path).await?;
                ServerState::sqlite(&db, config.feedback.write_mode)
            };

            println!("Starting ml-monitor on {}:{}", config.server.host, config.server.port);
            crate::server::start(&config.server.host, config.server.port, state).await?;
        }
        Commands::Migrate => {
            // Opening runs pending migrations
            let db = SqliteDatabase::open(&config.database.path).await?;
            let version = db.schema_version().await?;
            println!("Database {} at schema version {}", config.database.path.display(), version);
        }
        Commands::Reconcile => {
            let db = SqliteDatabase::open(&config.database.path).await?;
            let changed = db.ledger().reconcile_feedback_flags().await?;
            println!("Reconciled {} inference(s)", changed);
        }
        Commands::Demo { in_memory } => {
            let state = if in_memory {
                ServerState::in_memory(&MemoryDatabase::new(), config.feedback.write_mode)
            } else {
                let db = SqliteDatabase::open(&config.database.path).await?;
                ServerState::sqlite(&db, config.feedback.write_mode)
            };
            run_demo(&state).await?;
        }
    }

    Ok(())
}

/// Walk through one inference and its feedback against the given stores
async fn run_demo(state: &ServerState) -> Result<()> {
    let inference = state
        .inferences
        .insert(NewInference::generate(
            "example_model",
            "1.0.0",
            json!({ "input": "some input data" }),
            json!({ "output": "some output data" }),
        ))
        .await
        .context("Failed to insert inference")?;
    println!("Inserted inference with ID: {}", inference.id);

    let feedback = NewFeedback::generate(
        &inference.id,
        json!({ "corrected_output": "the correct output" }),
    );
    match state.feedback_mode {
        FeedbackWriteMode::Transactional => {
            state.ledger.record_feedback(feedback).await.context("Failed to record feedback")?;
        }
        FeedbackWriteMode::Sequential => {
            state.feedback.insert(feedback).await.context("Failed to insert feedback")?;
            state
                .inferences
                .update_has_feedback(&inference.id, true)
                .await
                .context("Failed to update inference has_feedback")?;
        }
    }
    info!("Inserted feedback for inference {}", inference.id);

    let fetched = state.inferences.get_by_id(&inference.id).await?;
    println!("Fetched inference:\n{}", serde_json::to_string_pretty(&fetched)?);

    let all_feedback = state.feedback.list_by_inference_id(&inference.id).await?;
    println!(
        "Feedback for inference {}:\n{}",
        inference.id,
        serde_json::to_string_pretty(&all_feedback)?
    );

    Ok(())
}
