//! Backend seams.
//!
//! Each trait is the narrow slice of the hosted backend one hook needs.
//! `database::remote` implements them over PostgREST/GoTrue and
//! `database::memory` implements them in-process.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::auth::Session;
use crate::models::comments::Comment;
use crate::models::profiles::Profile;
use crate::models::votes::Vote;
use crate::realtime::ChangeFeed;

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Comments for a movie, newest first
    async fn list_comments(&self, movie_id: i64) -> Result<Vec<Comment>, String>;

    /// Insert with server-assigned id and timestamps
    async fn insert_comment(
        &self,
        movie_id: i64,
        user_id: &str,
        content: &str,
    ) -> Result<Comment, String>;

    /// Replace the content and bump `updated_at`. `None` if no such row.
    async fn update_comment(&self, id: i64, content: &str) -> Result<Option<Comment>, String>;

    async fn delete_comment(&self, id: i64) -> Result<(), String>;
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// The user's vote for a movie, if any
    async fn find_vote(&self, movie_id: i64, user_id: &str) -> Result<Option<Vote>, String>;

    async fn list_votes(&self, movie_id: i64) -> Result<Vec<Vote>, String>;

    /// Insert or update the single vote keyed by (movie, user)
    async fn upsert_vote(&self, movie_id: i64, user_id: &str, rating: f64)
        -> Result<Vote, String>;

    async fn delete_vote(&self, id: i64) -> Result<(), String>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String>;

    async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>, String>;
}

/// Result of a sign-up: a session when the backend confirms immediately,
/// otherwise the user must confirm by email first.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired { email: String },
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, String>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, String>;
}

/// Everything the sync hooks talk to, bundled for cheap cloning
#[derive(Clone)]
pub struct Stores {
    pub comments: Arc<dyn CommentStore>,
    pub votes: Arc<dyn VoteStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub feed: Arc<dyn ChangeFeed>,
}
