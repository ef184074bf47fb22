// Supabase Realtime (Phoenix channels, vsn 1.0.0) over a websocket
//
// Each subscription opens its own socket, joins one topic with a single
// postgres_changes binding and forwards matching row changes until it is
// cancelled. Subscribing only succeeds once the server accepts the join.
// Cancelling sends phx_leave and closes the socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::models::auth::SessionHandle;
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, Subscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RealtimeClient {
    socket_url: String,
    anon_key: String,
    session: SessionHandle,
}

impl RealtimeClient {
    pub fn new(base_url: &str, anon_key: &str, session: SessionHandle) -> Self {
        Self {
            socket_url: socket_url(base_url, anon_key),
            anon_key: anon_key.to_string(),
            session,
        }
    }
}

/// `https://x.supabase.co` -> `wss://x.supabase.co/realtime/v1/websocket?...`
pub fn socket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        base, anon_key
    )
}

pub fn join_message(topic: &str, filter: &ChangeFilter, access_token: &str, join_ref: &str) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": filter.table,
                    "filter": filter.expression(),
                }]
            },
            "access_token": access_token,
        },
        "ref": join_ref,
        "join_ref": join_ref,
    })
}

fn control_message(topic: &str, event: &str, msg_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": event,
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Outcome of our join if `text` is the `phx_reply` to `join_ref`
pub fn join_reply(text: &str, join_ref: &str) -> Option<Result<(), String>> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("event")?.as_str()? != "phx_reply" || value.get("ref")?.as_str()? != join_ref {
        return None;
    }
    let payload = value.get("payload")?;
    match payload.get("status").and_then(Value::as_str) {
        Some("ok") => Some(Ok(())),
        status => {
            let response = payload.get("response").cloned().unwrap_or(Value::Null);
            Some(Err(format!(
                "server replied {}: {}",
                status.unwrap_or("without a status"),
                response
            )))
        }
    }
}

/// Parse a `postgres_changes` frame into a [`ChangeEvent`]. Anything else
/// (replies, presence, system messages) yields `None`.
pub fn parse_change_message(text: &str) -> Option<ChangeEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }
    let data = value.get("payload")?.get("data")?;
    let kind = ChangeKind::parse(data.get("type")?.as_str()?)?;
    let table = data.get("table")?.as_str()?.to_string();
    Some(ChangeEvent {
        table,
        kind,
        new: non_empty(data.get("record")),
        old: non_empty(data.get("old_record")),
    })
}

fn non_empty(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(v) => Some(v.clone()),
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, String> {
        let (socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| format!("Failed to open realtime socket: {}", e))?;
        let (mut sink, mut stream) = socket.split();

        let topic = format!("realtime:{}", channel);
        let token = self
            .session
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());
        let join_ref = uuid::Uuid::new_v4().to_string();
        sink.send(Message::text(
            join_message(&topic, &filter, &token, &join_ref).to_string(),
        ))
        .await
        .map_err(|e| format!("Failed to join {}: {}", topic, e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let joined = tokio::time::timeout(JOIN_TIMEOUT, async {
            while let Some(frame) = stream.next().await {
                let msg = frame.map_err(|e| e.to_string())?;
                if msg.is_close() {
                    break;
                }
                let Ok(text) = msg.to_text() else { continue };
                if let Some(reply) = join_reply(text, &join_ref) {
                    return reply;
                }
                // Changes can race ahead of the reply; keep them.
                if let Some(event) = parse_change_message(text) {
                    let _ = tx.send(event);
                }
            }
            Err::<(), String>("socket closed before the server replied".to_string())
        })
        .await
        .map_err(|_| format!("Failed to join {}: no reply within {:?}", topic, JOIN_TIMEOUT))?;
        if let Err(reason) = joined {
            let _ = sink.close().await;
            return Err(format!("Failed to join {}: {}", topic, reason));
        }
        log::debug!("[realtime] joined {}", topic);

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut msg_ref: u64 = 1;
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        msg_ref += 1;
                        let leave = control_message(&topic, "phx_leave", msg_ref);
                        let _ = sink.send(Message::text(leave.to_string())).await;
                        let _ = sink.close().await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        msg_ref += 1;
                        let beat = control_message("phoenix", "heartbeat", msg_ref);
                        if let Err(e) = sink.send(Message::text(beat.to_string())).await {
                            log::warn!("[realtime] heartbeat failed on {}: {}", topic, e);
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(msg)) if msg.is_close() => break,
                        Some(Ok(msg)) if msg.is_text() => {
                            let Ok(text) = msg.to_text() else { continue };
                            if let Some(event) = parse_change_message(text) {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            } else if text.contains("\"status\":\"error\"") {
                                log::warn!("[realtime] {} rejected: {}", topic, text);
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::warn!("[realtime] socket error on {}: {}", topic, e);
                            break;
                        }
                        None => break,
                    }
                }
            }
            log::debug!("[realtime] {} closed", topic);
        });

        Ok(Subscription::new(channel, rx, move || {
            let _ = cancel_tx.send(());
        }))
    }
}
