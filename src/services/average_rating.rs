//! Community average rating for one movie.
//!
//! Every vote change on the movie triggers a full refetch and recompute.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::database::remote::votes::TABLE;
use crate::models::votes::RatingSummary;
use crate::realtime::{movie_channel, ChangeFilter, LiveUpdates};
use crate::store::{Stores, VoteStore};

#[derive(Debug, Clone, Default)]
pub struct AverageView {
    pub summary: RatingSummary,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct AverageState {
    view: AverageView,
    /// Refetches handed out and the newest one applied; an older response
    /// that arrives late never replaces a newer one
    issued: u64,
    applied: u64,
}

pub struct AverageRating {
    movie_id: i64,
    votes: Arc<dyn VoteStore>,
    state: Arc<Mutex<AverageState>>,
    live: Option<LiveUpdates>,
}

impl AverageRating {
    /// Start following vote changes, then fetch the current votes
    pub async fn open(movie_id: i64, stores: Stores) -> Self {
        let state = Arc::new(Mutex::new(AverageState::default()));
        state.lock().await.view.loading = true;

        let channel = movie_channel(TABLE, movie_id);
        let live = match stores
            .feed
            .subscribe(&channel, ChangeFilter::eq(TABLE, "movie_id", movie_id))
            .await
        {
            Ok(subscription) => {
                let votes = stores.votes.clone();
                let state = state.clone();
                Some(LiveUpdates::spawn(subscription, move |event| {
                    let votes = votes.clone();
                    let state = state.clone();
                    async move {
                        log::debug!("[ratings] vote {:?} on movie {}", event.kind, movie_id);
                        refresh(&*votes, &state, movie_id).await;
                    }
                }))
            }
            Err(e) => {
                log::warn!("[ratings] No live updates for {}: {}", channel, e);
                None
            }
        };

        refresh(&*stores.votes, &state, movie_id).await;

        Self {
            movie_id,
            votes: stores.votes,
            state,
            live,
        }
    }

    pub fn movie_id(&self) -> i64 {
        self.movie_id
    }

    pub async fn snapshot(&self) -> AverageView {
        self.state.lock().await.view.clone()
    }

    pub async fn summary(&self) -> RatingSummary {
        self.state.lock().await.view.summary.clone()
    }

    pub async fn refresh(&self) {
        refresh(&*self.votes, &self.state, self.movie_id).await;
    }

    pub fn close(&mut self) {
        self.live = None;
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }
}

async fn refresh(votes: &dyn VoteStore, state: &Mutex<AverageState>, movie_id: i64) {
    let ticket = {
        let mut state = state.lock().await;
        state.issued += 1;
        state.view.loading = true;
        state.issued
    };
    let result = votes.list_votes(movie_id).await;

    let mut state = state.lock().await;
    if ticket < state.applied {
        log::debug!("[ratings] dropping stale vote list for movie {}", movie_id);
        return;
    }
    state.applied = ticket;
    let settled = ticket == state.issued;
    let view = &mut state.view;
    match result {
        Ok(list) => {
            let ratings: Vec<f64> = list.iter().map(|v| v.rating).collect();
            view.summary = RatingSummary::from_ratings(&ratings);
            view.error = None;
        }
        Err(e) => {
            log::error!("[ratings] Error fetching votes: {}", e);
            view.error = Some(e);
        }
    }
    if settled {
        view.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryBackend;
    use crate::models::votes::Vote;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    async fn eventually_total(average: &AverageRating, total: usize) -> RatingSummary {
        for _ in 0..100 {
            let summary = average.summary().await;
            if summary.total == total {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("total never reached {}", total);
    }

    #[tokio::test]
    async fn mean_and_count_of_existing_votes() {
        let backend = MemoryBackend::new();
        backend.upsert_vote(550, "a", 4.0).await.unwrap();
        backend.upsert_vote(550, "b", 5.0).await.unwrap();
        backend.upsert_vote(550, "c", 3.0).await.unwrap();
        backend.upsert_vote(13, "a", 1.0).await.unwrap();

        let average = AverageRating::open(550, backend.stores()).await;
        let summary = average.summary().await;
        assert_eq!(summary.average, Some(4.0));
        assert_eq!(summary.total, 3);
    }

    #[tokio::test]
    async fn no_votes_means_no_average() {
        let backend = MemoryBackend::new();
        let average = AverageRating::open(550, backend.stores()).await;
        let view = average.snapshot().await;
        assert_eq!(view.summary.average, None);
        assert_eq!(view.summary.total, 0);
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn follows_vote_changes() {
        let backend = MemoryBackend::new();
        let average = AverageRating::open(550, backend.stores()).await;

        backend.upsert_vote(550, "a", 2.0).await.unwrap();
        let summary = eventually_total(&average, 1).await;
        assert_eq!(summary.average, Some(2.0));

        let vote = backend.upsert_vote(550, "b", 4.0).await.unwrap();
        eventually_total(&average, 2).await;

        backend.delete_vote(vote.id).await.unwrap();
        let summary = eventually_total(&average, 1).await;
        assert_eq!(summary.average, Some(2.0));
    }

    /// Commits a vote right after the first list is read
    struct LateVote {
        inner: MemoryBackend,
        fired: AtomicBool,
    }

    #[async_trait::async_trait]
    impl VoteStore for LateVote {
        async fn find_vote(&self, movie_id: i64, user_id: &str) -> Result<Option<Vote>, String> {
            self.inner.find_vote(movie_id, user_id).await
        }

        async fn list_votes(&self, movie_id: i64) -> Result<Vec<Vote>, String> {
            let listed = self.inner.list_votes(movie_id).await?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.inner.upsert_vote(movie_id, "other", 5.0).await?;
            }
            Ok(listed)
        }

        async fn upsert_vote(
            &self,
            movie_id: i64,
            user_id: &str,
            rating: f64,
        ) -> Result<Vote, String> {
            self.inner.upsert_vote(movie_id, user_id, rating).await
        }

        async fn delete_vote(&self, id: i64) -> Result<(), String> {
            self.inner.delete_vote(id).await
        }
    }

    #[tokio::test]
    async fn vote_committed_during_the_first_fetch_is_counted() {
        let backend = MemoryBackend::new();
        let stores = Stores {
            votes: Arc::new(LateVote {
                inner: backend.clone(),
                fired: AtomicBool::new(false),
            }),
            ..backend.stores()
        };

        let average = AverageRating::open(550, stores).await;
        let summary = eventually_total(&average, 1).await;
        assert_eq!(summary.average, Some(5.0));
        assert_eq!(backend.votes_for(550).len(), 1);
    }

    #[tokio::test]
    async fn response_older_than_the_applied_one_is_dropped() {
        let backend = MemoryBackend::new();
        backend.upsert_vote(550, "a", 3.0).await.unwrap();
        let state = Mutex::new(AverageState {
            applied: 2,
            ..Default::default()
        });

        refresh(&backend, &state, 550).await;
        assert_eq!(state.lock().await.view.summary.total, 0);

        refresh(&backend, &state, 550).await;
        let state = state.lock().await;
        assert_eq!(state.view.summary.total, 1);
        assert!(!state.view.loading);
    }

    #[tokio::test]
    async fn close_unsubscribes() {
        let backend = MemoryBackend::new();
        let mut average = AverageRating::open(550, backend.stores()).await;
        assert_eq!(backend.feed().listener_count(), 1);
        average.close();
        assert!(!average.is_live());
        assert_eq!(backend.feed().listener_count(), 0);
    }
}
