//! The signed-in user's own rating of one movie.
//!
//! Loaded once when opened; there is no subscription because only this user
//! writes their own vote.

use std::sync::Arc;

use crate::models::votes::{validate_rating, Vote};
use crate::store::VoteStore;

pub struct UserRating {
    votes: Arc<dyn VoteStore>,
    movie_id: i64,
    user_id: String,
    vote: Option<Vote>,
    loading: bool,
    error: Option<String>,
}

impl UserRating {
    pub async fn open(movie_id: i64, user_id: &str, votes: Arc<dyn VoteStore>) -> Self {
        let mut rating = Self {
            votes,
            movie_id,
            user_id: user_id.to_string(),
            vote: None,
            loading: true,
            error: None,
        };
        rating.load().await;
        rating
    }

    pub async fn load(&mut self) {
        self.loading = true;
        match self.votes.find_vote(self.movie_id, &self.user_id).await {
            Ok(vote) => {
                self.vote = vote;
                self.error = None;
            }
            Err(e) => {
                log::error!("[ratings] Error fetching rating: {}", e);
                self.error = Some(e);
            }
        }
        self.loading = false;
    }

    /// Current rating, `0.0` when the user has not rated the movie
    pub fn value(&self) -> f64 {
        self.vote.as_ref().map(|v| v.rating).unwrap_or(0.0)
    }

    pub fn vote(&self) -> Option<&Vote> {
        self.vote.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Create or replace the rating. Invalid values never reach the backend.
    pub async fn save(&mut self, value: f64) -> bool {
        if let Err(message) = validate_rating(value) {
            self.error = Some(message);
            return false;
        }
        self.loading = true;
        self.error = None;
        let ok = match self
            .votes
            .upsert_vote(self.movie_id, &self.user_id, value)
            .await
        {
            Ok(vote) => {
                log::debug!("[ratings] movie {} rated {}", self.movie_id, vote.rating);
                self.vote = Some(vote);
                true
            }
            Err(e) => {
                log::error!("[ratings] Error saving rating: {}", e);
                self.error = Some(e);
                false
            }
        };
        self.loading = false;
        ok
    }

    pub async fn delete(&mut self) -> bool {
        let Some(id) = self.vote.as_ref().map(|v| v.id) else {
            self.error = Some("No rating to delete".to_string());
            return false;
        };
        self.loading = true;
        self.error = None;
        let ok = match self.votes.delete_vote(id).await {
            Ok(()) => {
                self.vote = None;
                true
            }
            Err(e) => {
                log::error!("[ratings] Error deleting rating: {}", e);
                self.error = Some(e);
                false
            }
        };
        self.loading = false;
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryBackend;

    #[tokio::test]
    async fn unrated_reads_as_zero() {
        let backend = MemoryBackend::new();
        let rating = UserRating::open(550, "ada", Arc::new(backend)).await;
        assert_eq!(rating.value(), 0.0);
        assert!(rating.error().is_none());
        assert!(!rating.is_loading());
    }

    #[tokio::test]
    async fn saving_twice_keeps_a_single_vote() {
        let backend = MemoryBackend::new();
        let mut rating = UserRating::open(550, "ada", Arc::new(backend.clone())).await;

        assert!(rating.save(3.5).await);
        assert!(rating.save(4.5).await);
        assert_eq!(rating.value(), 4.5);

        let votes = backend.votes_for(550);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].rating, 4.5);

        let reopened = UserRating::open(550, "ada", Arc::new(backend)).await;
        assert_eq!(reopened.value(), 4.5);
    }

    #[tokio::test]
    async fn invalid_values_never_reach_the_backend() {
        let backend = MemoryBackend::new();
        let mut rating = UserRating::open(550, "ada", Arc::new(backend.clone())).await;
        let before = backend.request_count();

        assert!(!rating.save(0.0).await);
        assert!(!rating.save(5.5).await);
        assert!(!rating.save(3.3).await);
        assert!(!rating.save(f64::NAN).await);
        assert_eq!(backend.request_count(), before);
        assert!(rating.error().is_some());
    }

    #[tokio::test]
    async fn delete_without_a_rating_fails() {
        let backend = MemoryBackend::new();
        let mut rating = UserRating::open(550, "ada", Arc::new(backend.clone())).await;
        let before = backend.request_count();

        assert!(!rating.delete().await);
        assert_eq!(rating.error(), Some("No rating to delete"));
        assert_eq!(backend.request_count(), before);
    }

    #[tokio::test]
    async fn delete_resets_to_unrated() {
        let backend = MemoryBackend::new();
        let mut rating = UserRating::open(550, "ada", Arc::new(backend.clone())).await;
        rating.save(2.0).await;

        assert!(rating.delete().await);
        assert_eq!(rating.value(), 0.0);
        assert!(backend.votes_for(550).is_empty());
    }

    #[tokio::test]
    async fn backend_errors_are_kept_not_thrown() {
        let backend = MemoryBackend::new();
        let mut rating = UserRating::open(550, "ada", Arc::new(backend.clone())).await;
        backend.set_unavailable(true);
        assert!(!rating.save(4.0).await);
        assert!(rating.error().unwrap().contains("unreachable"));
        assert_eq!(rating.value(), 0.0);
    }
}
