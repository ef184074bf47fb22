//! Key/value storage in the state db, shaped like the browser's
//! `localStorage`: string keys, string (usually JSON) values.

use sqlx::SqlitePool;

pub async fn get_item(pool: &SqlitePool, key: &str) -> Result<Option<String>, String> {
    sqlx::query_scalar::<_, String>("SELECT value FROM local_storage WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|err| format!("Failed to read {key}: {err}"))
}

pub async fn set_item(pool: &SqlitePool, key: &str, value: &str) -> Result<(), String> {
    sqlx::query(
        "INSERT INTO local_storage (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .map_err(|err| format!("Failed to store {key}: {err}"))?;
    Ok(())
}

pub async fn remove_item(pool: &SqlitePool, key: &str) -> Result<(), String> {
    sqlx::query("DELETE FROM local_storage WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await
        .map_err(|err| format!("Failed to remove {key}: {err}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::local::state::init_memory_state_db;

    #[tokio::test]
    async fn set_overwrites_and_remove_clears() {
        let db = init_memory_state_db().await.unwrap();
        assert_eq!(get_item(&db.0, "k").await.unwrap(), None);

        set_item(&db.0, "k", "1").await.unwrap();
        set_item(&db.0, "k", "2").await.unwrap();
        assert_eq!(get_item(&db.0, "k").await.unwrap().as_deref(), Some("2"));

        remove_item(&db.0, "k").await.unwrap();
        assert_eq!(get_item(&db.0, "k").await.unwrap(), None);
    }
}
