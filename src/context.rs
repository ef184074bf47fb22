//! Application wiring: one place that turns an [`AppConfig`] into live
//! stores, services and the restored session.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::local::{init_state_db, StateDb};
use crate::database::memory::MemoryBackend;
use crate::database::remote::common::SupabaseClient;
use crate::database::remote::realtime::RealtimeClient;
use crate::database::remote::SupabaseBackend;
use crate::models::auth::{AuthUser, SessionHandle};
use crate::services::auth::AuthService;
use crate::services::average_rating::AverageRating;
use crate::services::catalog::CatalogClient;
use crate::services::comments::CommentThread;
use crate::services::favorites::FavoritesStore;
use crate::services::ratings::UserRating;
use crate::store::{AuthBackend, Stores};

pub struct AppContext {
    pub config: AppConfig,
    pub db: StateDb,
    pub session: SessionHandle,
    pub stores: Stores,
    pub auth: AuthService,
    pub favorites: FavoritesStore,
    catalog: Option<CatalogClient>,
}

impl AppContext {
    pub async fn init(config: AppConfig) -> Result<Self, String> {
        let db = init_state_db(&config.state_db).await?;
        Self::with_db(config, db).await
    }

    /// Build the context over an already opened state db
    pub async fn with_db(config: AppConfig, db: StateDb) -> Result<Self, String> {
        let session = SessionHandle::default();

        let (stores, auth_backend): (Stores, Arc<dyn AuthBackend>) = match &config.supabase {
            Some(supabase) => {
                log::info!("[context] Using backend at {}", supabase.url);
                let client = Arc::new(SupabaseClient::new(
                    supabase.url.clone(),
                    supabase.anon_key.clone(),
                ));
                let backend = Arc::new(SupabaseBackend::new(client, session.clone()));
                let feed = Arc::new(RealtimeClient::new(
                    &supabase.url,
                    &supabase.anon_key,
                    session.clone(),
                ));
                let stores = Stores {
                    comments: backend.clone(),
                    votes: backend.clone(),
                    profiles: backend.clone(),
                    feed,
                };
                let auth_backend: Arc<dyn AuthBackend> = backend;
                (stores, auth_backend)
            }
            None => {
                log::info!("[context] Offline mode, using in-process backend");
                let backend = MemoryBackend::new();
                let auth_backend: Arc<dyn AuthBackend> = Arc::new(backend.clone());
                (backend.stores(), auth_backend)
            }
        };

        let auth = AuthService::new(auth_backend, db.clone(), session.clone());
        auth.restore_session().await?;

        let favorites = FavoritesStore::load(db.0.clone()).await?;

        let catalog = config.catalog.api_key.as_deref().map(|key| {
            CatalogClient::new(&config.catalog.base_url, &config.catalog.image_base, key)
        });

        Ok(Self {
            config,
            db,
            session,
            stores,
            auth,
            favorites,
            catalog,
        })
    }

    pub fn catalog(&self) -> Result<&CatalogClient, String> {
        self.catalog.as_ref().ok_or_else(|| {
            format!(
                "{} is not set; movie details are unavailable",
                crate::config::ENV_TMDB_API_KEY
            )
        })
    }

    /// The signed-in user, or an error naming the action that needs one
    pub async fn require_user(&self, action: &str) -> Result<AuthUser, String> {
        self.session
            .user()
            .await
            .ok_or_else(|| format!("You must be signed in to {}", action))
    }

    pub async fn comments(&self, movie_id: i64) -> CommentThread {
        CommentThread::open(movie_id, self.stores.clone()).await
    }

    pub async fn average_rating(&self, movie_id: i64) -> AverageRating {
        AverageRating::open(movie_id, self.stores.clone()).await
    }

    pub async fn user_rating(&self, movie_id: i64, user_id: &str) -> UserRating {
        UserRating::open(movie_id, user_id, self.stores.votes.clone()).await
    }
}
