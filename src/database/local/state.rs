use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;

/// Durable per-device state: the `localStorage` analogue and the auth
/// session. Nothing in here is ever synced to the backend.
#[derive(Clone)]
pub struct StateDb(pub SqlitePool);

pub async fn init_state_db(db_path: &Path) -> Result<StateDb, String> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            format!("Failed to create state dir {}: {}", dir.display(), e)
        })?;
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            format!(
                "Failed to connect to state database at {}: {}",
                db_path.display(),
                e
            )
        })?;

    init_schema(&pool).await?;
    Ok(StateDb(pool))
}

/// Throwaway state db, used in offline mode and tests
pub async fn init_memory_state_db() -> Result<StateDb, String> {
    // A single connection: every sqlite::memory: connection is its own db.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| format!("Failed to open in-memory state database: {}", e))?;

    init_schema(&pool).await?;
    Ok(StateDb(pool))
}

async fn init_schema(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS local_storage (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to initialize local storage table: {}", e))?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS auth_session (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to initialize auth session table: {}", e))?;

    Ok(())
}
