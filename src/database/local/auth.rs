//! The signed-in session, kept in the state db so a restart stays signed in.

use sqlx::SqlitePool;

use crate::models::auth::Session;

/// Row key in `auth_session`; one session per state db
const SESSION_KEY: &str = "supabase_session";

/// Load the persisted session. An unreadable session is dropped rather
/// than failing startup.
pub async fn load_session(pool: &SqlitePool) -> Result<Option<Session>, String> {
    let saved: Option<String> =
        sqlx::query_scalar("SELECT value FROM auth_session WHERE key = ?")
            .bind(SESSION_KEY)
            .fetch_optional(pool)
            .await
            .map_err(|e| format!("Failed to load saved session: {}", e))?;

    let Some(saved) = saved else {
        log::debug!("[auth] No saved session");
        return Ok(None);
    };

    match serde_json::from_str::<Session>(&saved) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            log::warn!("[auth] Discarding unreadable saved session: {}", e);
            clear_session(pool).await?;
            Ok(None)
        }
    }
}

/// Persist the session, replacing any earlier one
pub async fn store_session(pool: &SqlitePool, session: &Session) -> Result<(), String> {
    let json = serde_json::to_string(session)
        .map_err(|e| format!("Failed to serialize session: {}", e))?;
    sqlx::query(
        "INSERT INTO auth_session (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(SESSION_KEY)
    .bind(json)
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to save session: {}", e))?;
    Ok(())
}

pub async fn clear_session(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query("DELETE FROM auth_session WHERE key = ?")
        .bind(SESSION_KEY)
        .execute(pool)
        .await
        .map_err(|e| format!("Failed to clear saved session: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::local::state::init_memory_state_db;
    use crate::models::auth::AuthUser;

    fn session() -> Session {
        Session {
            access_token: "jwt".to_string(),
            refresh_token: Some("r".to_string()),
            token_type: Some("bearer".to_string()),
            expires_in: Some(3600),
            user: AuthUser {
                id: "u-1".to_string(),
                email: Some("ada@example.com".to_string()),
                full_name: Some("Ada".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn session_round_trips_through_the_state_db() {
        let db = init_memory_state_db().await.unwrap();
        assert_eq!(load_session(&db.0).await.unwrap(), None);

        store_session(&db.0, &session()).await.unwrap();
        assert_eq!(load_session(&db.0).await.unwrap(), Some(session()));

        clear_session(&db.0).await.unwrap();
        assert_eq!(load_session(&db.0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_session_is_discarded() {
        let db = init_memory_state_db().await.unwrap();
        sqlx::query("INSERT INTO auth_session (key, value) VALUES (?, ?)")
            .bind(SESSION_KEY)
            .bind("{not json")
            .execute(&db.0)
            .await
            .unwrap();

        assert_eq!(load_session(&db.0).await.unwrap(), None);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_session")
            .fetch_one(&db.0)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn storing_again_replaces_the_saved_session() {
        let db = init_memory_state_db().await.unwrap();
        store_session(&db.0, &session()).await.unwrap();

        let mut next = session();
        next.access_token = "jwt-2".to_string();
        store_session(&db.0, &next).await.unwrap();

        assert_eq!(load_session(&db.0).await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn closed_db_reports_what_failed() {
        let db = init_memory_state_db().await.unwrap();
        db.0.close().await;
        let err = load_session(&db.0).await.unwrap_err();
        assert!(err.starts_with("Failed to load saved session"), "{}", err);
        let err = store_session(&db.0, &session()).await.unwrap_err();
        assert!(err.starts_with("Failed to save session"), "{}", err);
    }
}
