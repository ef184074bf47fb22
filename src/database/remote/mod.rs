// Remote database operations against the hosted Supabase project
//
// Each module wraps one table (or the auth API) over the REST interface.
// `SupabaseBackend` exposes them through the traits in `crate::store`,
// authenticating with the current session's access token when there is one
// and falling back to the anon key for public reads.
//
// Tables:
// - comments  (movie_id, user_id, content, created_at, updated_at)
// - votes     (movie_id, user_id, rating, ...), unique on (movie_id, user_id)
// - profiles  (id, full_name, email)

pub mod auth;
pub mod comments;
pub mod common;
pub mod profiles;
pub mod realtime;
pub mod votes;

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::auth::{Session, SessionHandle};
use crate::models::comments::Comment;
use crate::models::profiles::Profile;
use crate::models::votes::Vote;
use crate::store::{AuthBackend, CommentStore, ProfileStore, SignUpOutcome, VoteStore};
use common::SupabaseClient;

#[derive(Clone)]
pub struct SupabaseBackend {
    client: Arc<SupabaseClient>,
    session: SessionHandle,
}

impl SupabaseBackend {
    pub fn new(client: Arc<SupabaseClient>, session: SessionHandle) -> Self {
        Self { client, session }
    }

    async fn token(&self) -> Option<String> {
        self.session.access_token().await
    }
}

#[async_trait]
impl CommentStore for SupabaseBackend {
    async fn list_comments(&self, movie_id: i64) -> Result<Vec<Comment>, String> {
        let token = self.token().await;
        Ok(comments::fetch_comments(&self.client, movie_id, token.as_deref()).await?)
    }

    async fn insert_comment(
        &self,
        movie_id: i64,
        user_id: &str,
        content: &str,
    ) -> Result<Comment, String> {
        let token = self.token().await;
        Ok(
            comments::insert_comment(&self.client, movie_id, user_id, content, token.as_deref())
                .await?,
        )
    }

    async fn update_comment(&self, id: i64, content: &str) -> Result<Option<Comment>, String> {
        let token = self.token().await;
        Ok(comments::update_comment(&self.client, id, content, token.as_deref()).await?)
    }

    async fn delete_comment(&self, id: i64) -> Result<(), String> {
        let token = self.token().await;
        Ok(comments::delete_comment(&self.client, id, token.as_deref()).await?)
    }
}

#[async_trait]
impl VoteStore for SupabaseBackend {
    async fn find_vote(&self, movie_id: i64, user_id: &str) -> Result<Option<Vote>, String> {
        let token = self.token().await;
        Ok(votes::fetch_vote(&self.client, movie_id, user_id, token.as_deref()).await?)
    }

    async fn list_votes(&self, movie_id: i64) -> Result<Vec<Vote>, String> {
        let token = self.token().await;
        Ok(votes::fetch_votes(&self.client, movie_id, token.as_deref()).await?)
    }

    async fn upsert_vote(
        &self,
        movie_id: i64,
        user_id: &str,
        rating: f64,
    ) -> Result<Vote, String> {
        let token = self.token().await;
        Ok(votes::upsert_vote(&self.client, movie_id, user_id, rating, token.as_deref()).await?)
    }

    async fn delete_vote(&self, id: i64) -> Result<(), String> {
        let token = self.token().await;
        Ok(votes::delete_vote(&self.client, id, token.as_deref()).await?)
    }
}

#[async_trait]
impl ProfileStore for SupabaseBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String> {
        let token = self.token().await;
        Ok(profiles::fetch_profile(&self.client, user_id, token.as_deref()).await?)
    }

    async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>, String> {
        let token = self.token().await;
        Ok(profiles::fetch_profiles(&self.client, user_ids, token.as_deref()).await?)
    }
}

#[async_trait]
impl AuthBackend for SupabaseBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, String> {
        Ok(auth::sign_in_with_password(&self.client, email, password).await?)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, String> {
        Ok(auth::sign_up(&self.client, email, password, full_name).await?)
    }
}
