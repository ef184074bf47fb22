//! In-process backend.
//!
//! Mirrors the hosted backend closely enough for the sync hooks to run
//! without a network: server-assigned ids and timestamps, newest-first
//! comment listing, one vote per (movie, user), password sign-in, and a
//! change event published for every committed write.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::remote::comments::{CommentRow, TABLE as COMMENTS};
use crate::database::remote::votes::{VoteRow, TABLE as VOTES};
use crate::models::auth::{AuthUser, Session};
use crate::models::comments::Comment;
use crate::models::profiles::Profile;
use crate::models::votes::Vote;
use crate::realtime::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, LocalChangeFeed, Subscription,
};
use crate::store::{AuthBackend, CommentStore, ProfileStore, SignUpOutcome, Stores, VoteStore};

struct UserRecord {
    id: String,
    email: String,
    password_digest: String,
    full_name: Option<String>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    comments: BTreeMap<i64, Comment>,
    votes: HashMap<(i64, String), Vote>,
    profiles: HashMap<String, Profile>,
    users: HashMap<String, UserRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    feed: LocalChangeFeed,
    unavailable: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
    require_confirmation: Arc<AtomicBool>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All hook-facing stores backed by this instance
    pub fn stores(&self) -> Stores {
        let backend = Arc::new(self.clone());
        Stores {
            comments: backend.clone(),
            votes: backend.clone(),
            profiles: backend.clone(),
            feed: backend,
        }
    }

    pub fn feed(&self) -> &LocalChangeFeed {
        &self.feed
    }

    /// Make every subsequent request fail, as if the network were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// When set, sign-up returns no session until the email is confirmed
    pub fn set_require_confirmation(&self, required: bool) {
        self.require_confirmation.store(required, Ordering::SeqCst);
    }

    /// Number of store requests served (or refused) so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn votes_for(&self, movie_id: i64) -> Vec<Vote> {
        self.lock()
            .votes
            .values()
            .filter(|v| v.movie_id == movie_id)
            .cloned()
            .collect()
    }

    /// Publish a change without touching the tables, standing in for a
    /// write made by another client
    pub fn publish(&self, event: ChangeEvent) {
        self.feed.publish(event);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn begin(&self) -> Result<(), String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("Request failed: backend unreachable".to_string());
        }
        Ok(())
    }

    fn emit(&self, table: &str, kind: ChangeKind, new: Option<serde_json::Value>, old: Option<serde_json::Value>) {
        self.feed.publish(ChangeEvent {
            table: table.to_string(),
            kind,
            new,
            old,
        });
    }
}

fn to_value<T: serde::Serialize>(row: &T) -> Option<serde_json::Value> {
    serde_json::to_value(row).ok()
}

#[async_trait]
impl CommentStore for MemoryBackend {
    async fn list_comments(&self, movie_id: i64) -> Result<Vec<Comment>, String> {
        self.begin()?;
        let tables = self.lock();
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.movie_id == movie_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| (&b.created_at, b.id).cmp(&(&a.created_at, a.id)));
        Ok(comments)
    }

    async fn insert_comment(
        &self,
        movie_id: i64,
        user_id: &str,
        content: &str,
    ) -> Result<Comment, String> {
        self.begin()?;
        let comment = {
            let mut tables = self.lock();
            let stamp = now();
            let comment = Comment {
                id: tables.next_id(),
                movie_id,
                user_id: user_id.to_string(),
                content: content.to_string(),
                created_at: stamp.clone(),
                updated_at: stamp,
            };
            tables.comments.insert(comment.id, comment.clone());
            comment
        };
        self.emit(
            COMMENTS,
            ChangeKind::Insert,
            to_value(&CommentRow::from(&comment)),
            None,
        );
        Ok(comment)
    }

    async fn update_comment(&self, id: i64, content: &str) -> Result<Option<Comment>, String> {
        self.begin()?;
        let updated = {
            let mut tables = self.lock();
            tables.comments.get_mut(&id).map(|c| {
                let old = c.clone();
                c.content = content.to_string();
                c.updated_at = now();
                (old, c.clone())
            })
        };
        let Some((old, new)) = updated else {
            return Ok(None);
        };
        self.emit(
            COMMENTS,
            ChangeKind::Update,
            to_value(&CommentRow::from(&new)),
            to_value(&CommentRow::from(&old)),
        );
        Ok(Some(new))
    }

    async fn delete_comment(&self, id: i64) -> Result<(), String> {
        self.begin()?;
        let removed = self.lock().comments.remove(&id);
        if removed.is_some() {
            // Like Postgres without REPLICA IDENTITY FULL: key only.
            self.emit(
                COMMENTS,
                ChangeKind::Delete,
                None,
                Some(serde_json::json!({ "id": id })),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl VoteStore for MemoryBackend {
    async fn find_vote(&self, movie_id: i64, user_id: &str) -> Result<Option<Vote>, String> {
        self.begin()?;
        Ok(self
            .lock()
            .votes
            .get(&(movie_id, user_id.to_string()))
            .cloned())
    }

    async fn list_votes(&self, movie_id: i64) -> Result<Vec<Vote>, String> {
        self.begin()?;
        Ok(self.votes_for(movie_id))
    }

    async fn upsert_vote(
        &self,
        movie_id: i64,
        user_id: &str,
        rating: f64,
    ) -> Result<Vote, String> {
        self.begin()?;
        let (vote, previous) = {
            let mut tables = self.lock();
            let key = (movie_id, user_id.to_string());
            let stamp = now();
            let previous = tables.votes.get(&key).cloned();
            let vote = match &previous {
                Some(existing) => Vote {
                    rating,
                    updated_at: stamp,
                    ..existing.clone()
                },
                None => Vote {
                    id: tables.next_id(),
                    movie_id,
                    user_id: user_id.to_string(),
                    rating,
                    created_at: stamp.clone(),
                    updated_at: stamp,
                },
            };
            tables.votes.insert(key, vote.clone());
            (vote, previous)
        };
        let kind = if previous.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.emit(
            VOTES,
            kind,
            to_value(&VoteRow::from(&vote)),
            previous.as_ref().and_then(|p| to_value(&VoteRow::from(p))),
        );
        Ok(vote)
    }

    async fn delete_vote(&self, id: i64) -> Result<(), String> {
        self.begin()?;
        let removed = {
            let mut tables = self.lock();
            let key = tables
                .votes
                .iter()
                .find(|(_, v)| v.id == id)
                .map(|(k, _)| k.clone());
            key.and_then(|k| tables.votes.remove(&k))
        };
        if let Some(vote) = removed {
            self.emit(
                VOTES,
                ChangeKind::Delete,
                None,
                Some(serde_json::json!({ "id": vote.id, "movie_id": vote.movie_id })),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String> {
        self.begin()?;
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>, String> {
        self.begin()?;
        let tables = self.lock();
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, String> {
        self.begin()?;
        let tables = self.lock();
        let user = tables
            .users
            .get(&email.to_lowercase())
            .filter(|u| u.password_digest == digest(&u.email, password))
            .ok_or_else(|| "Invalid login credentials".to_string())?;
        Ok(session_for(user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, String> {
        self.begin()?;
        let key = email.to_lowercase();
        let mut tables = self.lock();
        if tables.users.contains_key(&key) {
            return Err("User already registered".to_string());
        }
        let full_name = Some(full_name.trim().to_string()).filter(|n| !n.is_empty());
        let user = UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: key.clone(),
            password_digest: digest(&key, password),
            full_name: full_name.clone(),
        };
        tables.profiles.insert(
            user.id.clone(),
            Profile {
                id: user.id.clone(),
                full_name,
                email: Some(key.clone()),
            },
        );
        let outcome = if self.require_confirmation.load(Ordering::SeqCst) {
            SignUpOutcome::ConfirmationRequired { email: key.clone() }
        } else {
            SignUpOutcome::SignedIn(session_for(&user))
        };
        tables.users.insert(key, user);
        Ok(outcome)
    }
}

fn session_for(user: &UserRecord) -> Session {
    Session {
        access_token: uuid::Uuid::new_v4().to_string(),
        refresh_token: None,
        token_type: Some("bearer".to_string()),
        expires_in: Some(3600),
        user: AuthUser {
            id: user.id.clone(),
            email: Some(user.email.clone()),
            full_name: user.full_name.clone(),
        },
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, String> {
        self.feed.subscribe(channel, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn comments_list_newest_first_per_movie() {
        let backend = MemoryBackend::new();
        let first = backend.insert_comment(1, "u", "first").await.unwrap();
        let second = backend.insert_comment(1, "u", "second").await.unwrap();
        backend.insert_comment(2, "u", "elsewhere").await.unwrap();

        let ids: Vec<i64> = backend
            .list_comments(1)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn upsert_keeps_one_vote_per_user_and_movie() {
        let backend = MemoryBackend::new();
        let a = backend.upsert_vote(7, "u", 3.5).await.unwrap();
        let b = backend.upsert_vote(7, "u", 4.0).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(backend.votes_for(7).len(), 1);
        assert_eq!(backend.votes_for(7)[0].rating, 4.0);

        backend.upsert_vote(7, "other", 2.0).await.unwrap();
        assert_eq!(backend.votes_for(7).len(), 2);
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let backend = MemoryBackend::new();
        let outcome = backend
            .sign_up("Ada@Example.com", "hunter22", "Ada")
            .await
            .unwrap();
        let SignUpOutcome::SignedIn(session) = outcome else {
            panic!("expected immediate session");
        };
        assert_eq!(session.user.full_name.as_deref(), Some("Ada"));

        let again = backend
            .sign_in_with_password("ada@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(again.user.id, session.user.id);
        assert!(backend
            .sign_in_with_password("ada@example.com", "wrong")
            .await
            .is_err());
        assert!(backend.sign_up("ada@example.com", "x", "Ada").await.is_err());

        let profile = backend.get_profile(&session.user.id).await.unwrap().unwrap();
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn unavailable_backend_refuses_requests() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        assert!(backend.list_comments(1).await.is_err());
        assert_eq!(backend.request_count(), 1);
    }
}
