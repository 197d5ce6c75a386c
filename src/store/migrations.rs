//! Forward-only schema migrations
//!
//! The applied version lives in `PRAGMA user_version`, so a database that was
//! migrated once is recognised on the next open.

use rusqlite::Connection;
use tracing::{debug, info};

use super::StoreResult;

/// Ordered migrations, `(version, sql)`. Versions start at 1 and never change.
pub const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
    CREATE TABLE IF NOT EXISTS inferences (
        id TEXT PRIMARY KEY,
        model_name TEXT NOT NULL,
        model_version TEXT NOT NULL,
        input_data TEXT NOT NULL,
        output_data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        has_feedback INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS feedback (
        id TEXT PRIMARY KEY,
        inference_id TEXT NOT NULL REFERENCES inferences(id),
        feedback_data TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_feedback_inference ON feedback(inference_id);
    "#,
)];

/// Current schema version of the database
pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Apply every pending migration, each in its own transaction.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &mut Connection) -> StoreResult<usize> {
    let current = schema_version(conn)?;
    let mut applied = 0;

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        // PRAGMA does not accept bound parameters
        tx.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        tx.commit()?;

        info!("Applied schema migration {}", version);
        applied += 1;
    }

    if applied == 0 {
        debug!("Schema up to date at version {}", current);
    }
    Ok(applied)
}
