//! Favorites store.
//!
//! The list lives in memory and is written back to the state db's local
//! storage after every change. There is a single writer (this process), so
//! no merging is needed.

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::database::local::storage;
use crate::models::favorites::Favorite;

pub const FAVORITES_KEY: &str = "movieFavorites";

/// Ordered favorites list without any storage attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Favorites {
    items: Vec<Favorite>,
}

impl Favorites {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            items: serde_json::from_str(json)?,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.items)
    }

    /// Append unless a favorite with the same id exists. Returns whether
    /// the list changed.
    pub fn add(&mut self, favorite: Favorite) -> bool {
        if self.contains(favorite.id) {
            return false;
        }
        self.items.push(favorite);
        true
    }

    pub fn remove(&mut self, movie_id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|f| f.id != movie_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.items.is_empty();
        self.items.clear();
        changed
    }

    pub fn contains(&self, movie_id: i64) -> bool {
        self.items.iter().any(|f| f.id == movie_id)
    }

    pub fn items(&self) -> &[Favorite] {
        &self.items
    }
}

/// Favorites bound to durable storage
pub struct FavoritesStore {
    pool: SqlitePool,
    favorites: Mutex<Favorites>,
}

impl FavoritesStore {
    /// Read the stored list. Unreadable data is logged and replaced by an
    /// empty list on the next write.
    pub async fn load(pool: SqlitePool) -> Result<Self, String> {
        let favorites = match storage::get_item(&pool, FAVORITES_KEY).await? {
            None => Favorites::default(),
            Some(json) => Favorites::from_json(&json).unwrap_or_else(|e| {
                log::error!("[favorites] Error loading favorites: {}", e);
                Favorites::default()
            }),
        };
        log::debug!("[favorites] loaded {} favorites", favorites.items().len());
        Ok(Self {
            pool,
            favorites: Mutex::new(favorites),
        })
    }

    pub async fn list(&self) -> Vec<Favorite> {
        self.favorites.lock().await.items().to_vec()
    }

    pub async fn contains(&self, movie_id: i64) -> bool {
        self.favorites.lock().await.contains(movie_id)
    }

    /// Idempotent: adding a movie that is already a favorite is a no-op
    pub async fn add(&self, favorite: Favorite) -> Result<bool, String> {
        self.mutate(|f| f.add(favorite)).await
    }

    pub async fn remove(&self, movie_id: i64) -> Result<bool, String> {
        self.mutate(|f| f.remove(movie_id)).await
    }

    pub async fn clear(&self) -> Result<bool, String> {
        self.mutate(Favorites::clear).await
    }

    /// Add if absent, remove if present. Returns whether the movie is a
    /// favorite afterwards.
    pub async fn toggle(&self, favorite: Favorite) -> Result<bool, String> {
        let id = favorite.id;
        let mut now_favorite = false;
        self.mutate(|f| {
            if f.contains(id) {
                f.remove(id)
            } else {
                now_favorite = true;
                f.add(favorite)
            }
        })
        .await?;
        Ok(now_favorite)
    }

    async fn mutate(&self, op: impl FnOnce(&mut Favorites) -> bool) -> Result<bool, String> {
        let mut favorites = self.favorites.lock().await;
        let mut next = favorites.clone();
        if !op(&mut next) {
            return Ok(false);
        }
        let json = next
            .to_json()
            .map_err(|e| format!("Failed to serialize favorites: {}", e))?;
        // Persist while still holding the lock so writes land in order; the
        // in-memory list only moves once storage has the new value.
        storage::set_item(&self.pool, FAVORITES_KEY, &json).await?;
        *favorites = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::local::state::{init_memory_state_db, init_state_db};

    fn movie(id: i64, title: &str) -> Favorite {
        Favorite {
            id,
            title: title.to_string(),
            poster: format!("https://image.tmdb.org/t/p/w500/{}.jpg", id),
            release_date: Some("1999-10-15".to_string()),
        }
    }

    #[test]
    fn adding_twice_leaves_the_list_unchanged() {
        let mut favorites = Favorites::default();
        assert!(favorites.add(movie(550, "Fight Club")));
        let before = favorites.clone();
        assert!(!favorites.add(movie(550, "Fight Club (again)")));
        assert_eq!(favorites, before);
    }

    #[test]
    fn removing_a_missing_id_is_a_no_op() {
        let mut favorites = Favorites::default();
        favorites.add(movie(550, "Fight Club"));
        let before = favorites.clone();
        assert!(!favorites.remove(13));
        assert_eq!(favorites, before);
    }

    #[test]
    fn reads_the_stored_json_layout() {
        let json = r#"[{"id":550,"title":"Fight Club","poster":"https://image.tmdb.org/t/p/w500/a.jpg","release_date":"1999-10-15"}]"#;
        let favorites = Favorites::from_json(json).unwrap();
        assert!(favorites.contains(550));
        assert_eq!(favorites.to_json().unwrap(), json);
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let db = init_state_db(&path).await.unwrap();
            let store = FavoritesStore::load(db.0.clone()).await.unwrap();
            assert!(store.add(movie(550, "Fight Club")).await.unwrap());
            assert!(store.add(movie(13, "Forrest Gump")).await.unwrap());
            assert!(!store.add(movie(13, "Forrest Gump")).await.unwrap());
            assert!(store.remove(550).await.unwrap());
            db.0.close().await;
        }

        let db = init_state_db(&path).await.unwrap();
        let store = FavoritesStore::load(db.0).await.unwrap();
        let ids: Vec<i64> = store.list().await.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![13]);
    }

    #[tokio::test]
    async fn corrupt_storage_loads_empty() {
        let db = init_memory_state_db().await.unwrap();
        storage::set_item(&db.0, FAVORITES_KEY, "[{broken").await.unwrap();
        let store = FavoritesStore::load(db.0.clone()).await.unwrap();
        assert!(store.list().await.is_empty());

        store.add(movie(1, "Toy Story")).await.unwrap();
        let stored = storage::get_item(&db.0, FAVORITES_KEY).await.unwrap().unwrap();
        assert!(stored.contains("Toy Story"));
    }

    #[tokio::test]
    async fn failed_write_leaves_the_list_unchanged() {
        let db = init_memory_state_db().await.unwrap();
        let store = FavoritesStore::load(db.0.clone()).await.unwrap();
        store.add(movie(1, "Toy Story")).await.unwrap();

        db.0.close().await;
        assert!(store.add(movie(7, "Se7en")).await.is_err());
        assert!(store.remove(1).await.is_err());

        let ids: Vec<i64> = store.list().await.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1]);
        assert!(!store.contains(7).await);
    }

    #[tokio::test]
    async fn toggle_and_clear() {
        let db = init_memory_state_db().await.unwrap();
        let store = FavoritesStore::load(db.0).await.unwrap();
        assert!(store.toggle(movie(1, "Toy Story")).await.unwrap());
        assert!(store.contains(1).await);
        assert!(!store.toggle(movie(1, "Toy Story")).await.unwrap());
        assert!(!store.contains(1).await);

        store.add(movie(2, "Jumanji")).await.unwrap();
        assert!(store.clear().await.unwrap());
        assert!(!store.clear().await.unwrap());
        assert!(store.list().await.is_empty());
    }
}
