//! Comment thread for one movie.
//!
//! Holds the locally cached comment list and keeps it in step with the
//! backend two ways: the result of each add/update/delete is applied as
//! soon as the backend confirms it, and a realtime subscription merges
//! changes made by other sessions. Both paths go through the same merge
//! helpers, so an echo of our own write never duplicates an entry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::database::remote::comments::{CommentRow, TABLE};
use crate::models::comments::{
    Comment, CommentAuthor, CommentWithAuthor, CommentsView, MAX_COMMENT_LENGTH,
};
use crate::models::profiles::Profile;
use crate::realtime::{movie_channel, ChangeEvent, ChangeFilter, ChangeKind, LiveUpdates};
use crate::store::{ProfileStore, Stores};

struct ThreadState {
    movie_id: i64,
    /// Bumped whenever the thread is pointed at another movie; results of
    /// requests started under an older epoch are discarded.
    epoch: u64,
    comments: Vec<CommentWithAuthor>,
    loading: bool,
    error: Option<String>,
    /// Changes applied while a fetch is in flight, replayed over its result
    pending: Option<Vec<ThreadChange>>,
    fetches: u32,
}

#[derive(Clone)]
enum ThreadChange {
    Upsert(CommentWithAuthor),
    Replace(CommentWithAuthor),
    /// New text for a listed comment; the author stays as cached
    Edit(Comment),
    Remove(i64),
}

impl ThreadState {
    fn new(movie_id: i64) -> Self {
        Self {
            movie_id,
            epoch: 0,
            comments: Vec::new(),
            loading: true,
            error: None,
            pending: None,
            fetches: 0,
        }
    }

    /// Apply a change, remembering it if a fetch could still overwrite it
    fn apply(&mut self, change: ThreadChange) {
        if let Some(pending) = self.pending.as_mut() {
            pending.push(change.clone());
        }
        self.merge(change);
    }

    fn merge(&mut self, change: ThreadChange) {
        match change {
            ThreadChange::Upsert(comment) => self.upsert_front(comment),
            ThreadChange::Replace(comment) => self.replace(comment),
            ThreadChange::Edit(comment) => {
                if let Some(existing) = self.comments.iter_mut().find(|c| c.id() == comment.id) {
                    existing.comment = comment;
                }
            }
            ThreadChange::Remove(id) => self.remove(id),
        }
    }

    fn begin_fetch(&mut self) {
        self.fetches += 1;
        self.loading = true;
        if self.pending.is_none() {
            self.pending = Some(Vec::new());
        }
    }

    /// Take a fetched list as the base and replay what changed since the
    /// fetch started
    fn settle_fetch(&mut self, fetched: Vec<CommentWithAuthor>) {
        self.comments = fetched;
        for change in self.pending.clone().unwrap_or_default() {
            self.merge(change);
        }
    }

    fn end_fetch(&mut self) {
        self.fetches = self.fetches.saturating_sub(1);
        if self.fetches == 0 {
            self.pending = None;
        }
    }

    /// Insert at the top, or replace in place if the id is already listed
    fn upsert_front(&mut self, comment: CommentWithAuthor) {
        match self.comments.iter_mut().find(|c| c.id() == comment.id()) {
            Some(existing) => *existing = comment,
            None => self.comments.insert(0, comment),
        }
    }

    fn replace(&mut self, comment: CommentWithAuthor) {
        if let Some(existing) = self.comments.iter_mut().find(|c| c.id() == comment.id()) {
            *existing = comment;
        }
    }

    fn remove(&mut self, id: i64) {
        self.comments.retain(|c| c.id() != id);
    }

    fn find(&self, id: i64) -> Option<&CommentWithAuthor> {
        self.comments.iter().find(|c| c.id() == id)
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.loading = false;
    }
}

pub struct CommentThread {
    stores: Stores,
    state: Arc<Mutex<ThreadState>>,
    live: Option<LiveUpdates>,
}

impl CommentThread {
    /// Start following changes, then load the movie's comments
    pub async fn open(movie_id: i64, stores: Stores) -> Self {
        let mut thread = Self {
            stores,
            state: Arc::new(Mutex::new(ThreadState::new(movie_id))),
            live: None,
        };
        thread.subscribe().await;
        thread.load().await;
        thread
    }

    pub async fn movie_id(&self) -> i64 {
        self.state.lock().await.movie_id
    }

    pub async fn snapshot(&self) -> CommentsView {
        let state = self.state.lock().await;
        CommentsView {
            movie_id: state.movie_id,
            comments: state.comments.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    /// Point the thread at another movie. The old subscription is released
    /// before anything for the new movie is fetched.
    pub async fn switch_movie(&mut self, movie_id: i64) {
        self.live = None;
        {
            let mut state = self.state.lock().await;
            state.movie_id = movie_id;
            state.epoch += 1;
            state.comments.clear();
            state.error = None;
            state.loading = true;
            state.pending = None;
            state.fetches = 0;
        }
        self.subscribe().await;
        self.load().await;
    }

    /// Release the realtime subscription
    pub fn close(&mut self) {
        self.live = None;
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Refetch the whole list. Changes merged while the request is out
    /// are kept on top of the fetched rows.
    pub async fn load(&self) {
        let (movie_id, epoch) = {
            let mut state = self.state.lock().await;
            state.begin_fetch();
            (state.movie_id, state.epoch)
        };

        let result = match self.stores.comments.list_comments(movie_id).await {
            Ok(comments) => Ok(with_authors(&*self.stores.profiles, comments).await),
            Err(e) => Err(e),
        };

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        match result {
            Ok(comments) => {
                state.settle_fetch(comments);
                state.error = None;
                state.loading = false;
            }
            Err(e) => {
                log::error!("[comments] Error fetching comments: {}", e);
                state.fail(e);
            }
        }
        state.end_fetch();
    }

    async fn subscribe(&mut self) {
        let movie_id = self.state.lock().await.movie_id;
        let channel = movie_channel(TABLE, movie_id);
        let filter = ChangeFilter::eq(TABLE, "movie_id", movie_id);
        match self.stores.feed.subscribe(&channel, filter).await {
            Ok(subscription) => {
                let state = self.state.clone();
                let profiles = self.stores.profiles.clone();
                let epoch = state.lock().await.epoch;
                self.live = Some(LiveUpdates::spawn(subscription, move |event| {
                    let state = state.clone();
                    let profiles = profiles.clone();
                    async move { apply_change(&state, &*profiles, epoch, event).await }
                }));
            }
            Err(e) => {
                // The list still works; it just won't update by itself.
                log::warn!("[comments] No live updates for {}: {}", channel, e);
            }
        }
    }

    /// Post a comment. Returns whether it was stored; the reason for a
    /// failure is left in the view's `error`.
    pub async fn add(&self, content: &str, author_id: &str) -> bool {
        let content = content.trim();
        let (movie_id, epoch) = {
            let mut state = self.state.lock().await;
            if let Err(message) = validate_content(content, "Comment cannot be empty") {
                state.error = Some(message);
                return false;
            }
            if author_id.is_empty() {
                state.error = Some("You must be signed in to comment".to_string());
                return false;
            }
            state.loading = true;
            state.error = None;
            (state.movie_id, state.epoch)
        };

        match self
            .stores
            .comments
            .insert_comment(movie_id, author_id, content)
            .await
        {
            Ok(comment) => {
                let author = author_of(&*self.stores.profiles, &comment.user_id).await;
                let mut state = self.state.lock().await;
                if state.epoch == epoch {
                    state.apply(ThreadChange::Upsert(CommentWithAuthor { comment, author }));
                }
                state.loading = false;
                true
            }
            Err(e) => {
                log::error!("[comments] Error adding comment: {}", e);
                self.state.lock().await.fail(e);
                false
            }
        }
    }

    /// Edit a comment's text. Only its author may do this.
    pub async fn update(&self, id: i64, content: &str, actor_id: &str) -> bool {
        let content = content.trim();
        let epoch = {
            let mut state = self.state.lock().await;
            if let Err(message) = validate_content(content, "Comment content cannot be empty") {
                state.error = Some(message);
                return false;
            }
            if let Err(message) = check_author(&state, id, actor_id, "edit") {
                state.error = Some(message);
                return false;
            }
            state.loading = true;
            state.error = None;
            state.epoch
        };

        match self.stores.comments.update_comment(id, content).await {
            Ok(Some(comment)) => {
                let author = author_of(&*self.stores.profiles, &comment.user_id).await;
                let mut state = self.state.lock().await;
                if state.epoch == epoch {
                    state.apply(ThreadChange::Replace(CommentWithAuthor { comment, author }));
                }
                state.loading = false;
                true
            }
            Ok(None) => {
                self.state.lock().await.fail("Comment not found");
                false
            }
            Err(e) => {
                log::error!("[comments] Error updating comment: {}", e);
                self.state.lock().await.fail(e);
                false
            }
        }
    }

    /// Delete a comment. Only its author may do this.
    pub async fn delete(&self, id: i64, actor_id: &str) -> bool {
        let epoch = {
            let mut state = self.state.lock().await;
            if let Err(message) = check_author(&state, id, actor_id, "delete") {
                state.error = Some(message);
                return false;
            }
            state.loading = true;
            state.error = None;
            state.epoch
        };

        match self.stores.comments.delete_comment(id).await {
            Ok(()) => {
                let mut state = self.state.lock().await;
                if state.epoch == epoch {
                    state.apply(ThreadChange::Remove(id));
                }
                state.loading = false;
                true
            }
            Err(e) => {
                log::error!("[comments] Error deleting comment: {}", e);
                self.state.lock().await.fail(e);
                false
            }
        }
    }
}

fn validate_content(content: &str, empty_message: &str) -> Result<(), String> {
    if content.is_empty() {
        return Err(empty_message.to_string());
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LENGTH
        ));
    }
    Ok(())
}

fn check_author(state: &ThreadState, id: i64, actor_id: &str, action: &str) -> Result<(), String> {
    let comment = state
        .find(id)
        .ok_or_else(|| "Comment not found".to_string())?;
    if actor_id.is_empty() || !comment.is_authored_by(actor_id) {
        return Err(format!("Only the author can {} this comment", action));
    }
    Ok(())
}

fn to_author(profile: Profile) -> CommentAuthor {
    CommentAuthor {
        email: profile.email,
        full_name: profile.full_name,
    }
}

/// Profile lookup failures only cost the display name, never the comment
async fn author_of(profiles: &dyn ProfileStore, user_id: &str) -> Option<CommentAuthor> {
    match profiles.get_profile(user_id).await {
        Ok(profile) => profile.map(to_author),
        Err(e) => {
            log::warn!("[comments] Profile lookup for {} failed: {}", user_id, e);
            None
        }
    }
}

/// Attach authors with one bulk profile lookup
async fn with_authors(profiles: &dyn ProfileStore, comments: Vec<Comment>) -> Vec<CommentWithAuthor> {
    let mut user_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
    user_ids.sort();
    user_ids.dedup();

    let by_id: HashMap<String, Profile> = match profiles.get_profiles(&user_ids).await {
        Ok(list) => list.into_iter().map(|p| (p.id.clone(), p)).collect(),
        Err(e) => {
            log::warn!("[comments] Profile lookup failed: {}", e);
            HashMap::new()
        }
    };

    comments
        .into_iter()
        .map(|comment| {
            let author = by_id.get(&comment.user_id).cloned().map(to_author);
            CommentWithAuthor { comment, author }
        })
        .collect()
}

fn decode(record: Option<&serde_json::Value>) -> Option<Comment> {
    let record = record?;
    match serde_json::from_value::<CommentRow>(record.clone()) {
        Ok(row) => Some(row.into()),
        Err(e) => {
            log::warn!("[comments] Ignoring malformed change record: {}", e);
            None
        }
    }
}

/// Merge one realtime change into the thread
async fn apply_change(
    state: &Mutex<ThreadState>,
    profiles: &dyn ProfileStore,
    epoch: u64,
    event: ChangeEvent,
) {
    let movie_id = {
        let state = state.lock().await;
        if state.epoch != epoch {
            return;
        }
        state.movie_id
    };

    match event.kind {
        ChangeKind::Insert => {
            let Some(comment) = decode(event.new.as_ref()) else {
                return;
            };
            if comment.movie_id != movie_id {
                log::debug!(
                    "[comments] dropping insert for movie {} in movie {} view",
                    comment.movie_id,
                    movie_id
                );
                return;
            }
            let author = author_of(profiles, &comment.user_id).await;
            let mut state = state.lock().await;
            if state.epoch == epoch {
                state.apply(ThreadChange::Upsert(CommentWithAuthor { comment, author }));
            }
        }
        ChangeKind::Update => {
            let Some(comment) = decode(event.new.as_ref()) else {
                return;
            };
            if comment.movie_id != movie_id {
                return;
            }
            let mut state = state.lock().await;
            if state.epoch == epoch {
                state.apply(ThreadChange::Edit(comment));
            }
        }
        ChangeKind::Delete => {
            let Some(id) = event
                .old
                .as_ref()
                .and_then(|old| old.get("id"))
                .and_then(|id| id.as_i64())
            else {
                return;
            };
            let mut state = state.lock().await;
            if state.epoch == epoch {
                state.apply(ThreadChange::Remove(id));
            }
        }
    }
}
