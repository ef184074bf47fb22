//! Row-level change notifications.
//!
//! A [`ChangeFeed`] hands out [`Subscription`]s filtered to one table and one
//! column value. Dropping or unsubscribing a subscription releases the
//! listener; the hooks in `services` rely on that to avoid delivering one
//! movie's events into another movie's view.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One row change. `new` is set for inserts and updates, `old` for updates
/// and deletes (deletes may only carry the primary key).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

impl ChangeEvent {
    /// The row image a filter should be evaluated against
    pub fn record(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            _ => self.new.as_ref(),
        }
    }
}

/// Equality filter on a single column, e.g. `movie_id=eq.550`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn eq(table: &str, column: &str, value: impl ToString) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Filter expression in PostgREST syntax
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Deletes usually carry only the primary key, so a row image without
    /// the filter column is let through; consumers match on id.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        let Some(record) = event.record() else {
            return false;
        };
        match record.get(&self.column) {
            None | Some(Value::Null) => event.kind == ChangeKind::Delete,
            Some(Value::String(s)) => *s == self.value,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Channel name for a per-movie subscription, e.g. `comments:movie_550`
pub fn movie_channel(table: &str, movie_id: i64) -> String {
    format!("{}:movie_{}", table, movie_id)
}

/// Push source of row changes
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, channel: &str, filter: ChangeFilter)
        -> Result<Subscription, String>;
}

/// Live subscription. Events arrive through [`Subscription::next`];
/// the listener is released on [`Subscription::unsubscribe`] or drop.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            handle: SubscriptionHandle {
                channel: channel.into(),
                cancel: Some(Box::new(cancel)),
            },
        }
    }

    pub fn channel(&self) -> &str {
        &self.handle.channel
    }

    /// Next event, or `None` once the feed side has gone away
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {
        self.handle.cancel();
    }

    /// Separate the event stream from the cancellation handle so the stream
    /// can move into a task while the owner keeps the handle.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<ChangeEvent>, SubscriptionHandle) {
        (self.events, self.handle)
    }
}

/// Cancellation side of a subscription. Cancels on drop.
pub struct SubscriptionHandle {
    channel: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            log::debug!("[realtime] unsubscribing from {}", self.channel);
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// A subscription wired to a handler running on its own task. Dropping it
/// cancels the subscription and stops the task.
pub struct LiveUpdates {
    handle: Option<SubscriptionHandle>,
    task: JoinHandle<()>,
}

impl LiveUpdates {
    pub fn spawn<F, Fut>(subscription: Subscription, mut on_event: F) -> Self
    where
        F: FnMut(ChangeEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (mut events, handle) = subscription.into_parts();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                on_event(event).await;
            }
        });
        Self {
            handle: Some(handle),
            task,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.channel.as_str())
    }
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.task.abort();
    }
}

struct Listener {
    channel: String,
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct FeedInner {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// In-process change feed. Writers call [`LocalChangeFeed::publish`] and
/// every matching live subscription receives a copy.
#[derive(Clone, Default)]
pub struct LocalChangeFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: ChangeEvent) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Receivers that went away without unsubscribing are pruned here.
        inner.listeners.retain(|_, l| !l.tx.is_closed());
        for listener in inner.listeners.values() {
            if listener.filter.matches(&event) {
                log::trace!("[realtime] {:?} on {}", event.kind, listener.channel);
                let _ = listener.tx.send(event.clone());
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.listeners.len(),
            Err(poisoned) => poisoned.into_inner().listeners.len(),
        }
    }

    fn remove(inner: &Weak<Mutex<FeedInner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            let mut guard = match inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.listeners.remove(&id);
        }
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| "Change feed lock poisoned".to_string())?;
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(
                id,
                Listener {
                    channel: channel.to_string(),
                    filter,
                    tx,
                },
            );
            id
        };
        log::debug!("[realtime] subscribed to {}", channel);

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(channel, rx, move || {
            LocalChangeFeed::remove(&weak, id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(table: &str, record: Value) -> ChangeEvent {
        ChangeEvent {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            new: Some(record),
            old: None,
        }
    }

    #[test]
    fn filter_matches_numbers_and_strings() {
        let filter = ChangeFilter::eq("comments", "movie_id", 550);
        assert_eq!(filter.expression(), "movie_id=eq.550");
        assert!(filter.matches(&insert("comments", json!({"movie_id": 550}))));
        assert!(filter.matches(&insert("comments", json!({"movie_id": "550"}))));
        assert!(!filter.matches(&insert("comments", json!({"movie_id": 551}))));
        assert!(!filter.matches(&insert("votes", json!({"movie_id": 550}))));
    }

    #[test]
    fn key_only_deletes_pass_the_filter() {
        let filter = ChangeFilter::eq("comments", "movie_id", 550);
        let delete = ChangeEvent {
            table: "comments".to_string(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(json!({"id": 9})),
        };
        assert!(filter.matches(&delete));
    }

    #[tokio::test]
    async fn publish_reaches_only_matching_subscribers() {
        let feed = LocalChangeFeed::new();
        let mut a = feed
            .subscribe("comments:movie_1", ChangeFilter::eq("comments", "movie_id", 1))
            .await
            .unwrap();
        let mut b = feed
            .subscribe("comments:movie_2", ChangeFilter::eq("comments", "movie_id", 2))
            .await
            .unwrap();

        feed.publish(insert("comments", json!({"id": 1, "movie_id": 1})));

        let got = a.next().await.unwrap();
        assert_eq!(got.new.unwrap()["id"], 1);
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_releases_the_listener() {
        let feed = LocalChangeFeed::new();
        let sub = feed
            .subscribe("votes:movie_1", ChangeFilter::eq("votes", "movie_id", 1))
            .await
            .unwrap();
        assert_eq!(feed.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(feed.listener_count(), 0);

        {
            let _dropped = feed
                .subscribe("votes:movie_1", ChangeFilter::eq("votes", "movie_id", 1))
                .await
                .unwrap();
            assert_eq!(feed.listener_count(), 1);
        }
        assert_eq!(feed.listener_count(), 0);
    }

    #[test]
    fn channel_names_are_per_movie() {
        assert_eq!(movie_channel("comments", 550), "comments:movie_550");
    }
}
