use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::{Message, TypingPing};
use crate::config::AppConfig;

use super::Error;

/// Channel carrying the room's INSERT events from the database.
const MESSAGES_TOPIC: &str = "realtime:messages";
/// Channel carrying ephemeral typing broadcasts.
const TYPING_TOPIC: &str = "realtime:typing";
/// Reserved topic for socket-level heartbeats.
const PHOENIX_TOPIC: &str = "phoenix";
/// Broadcast event name for typing pings.
const TYPING_EVENT: &str = "typing";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One frame on the socket. Everything in both directions is this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

/// What the feed hands the backend worker.
#[derive(Debug)]
pub enum FeedUpdate {
    /// Both channels joined; live events follow.
    Connected,
    MessageInserted(Message),
    Typing(TypingPing),
    /// Link lost. The feed retries on its own after a fixed delay.
    Disconnected(String),
}

enum LinkState {
    Down { retry_at: Instant },
    Up(Channel),
}

/// Realtime side of the backend: joins the two channels, keeps the link
/// alive with heartbeats, and reconnects with a fixed delay when it drops.
pub struct RealtimeFeed {
    config: AppConfig,
    access_token: Option<String>,
    state: LinkState,
}

impl RealtimeFeed {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            access_token: None,
            state: LinkState::Down {
                retry_at: Instant::now(),
            },
        }
    }

    /// Next event from the link. Reconnects behind the scenes; each
    /// downtime transition surfaces exactly one `Disconnected`.
    pub async fn next_update(&mut self) -> FeedUpdate {
        loop {
            match &mut self.state {
                LinkState::Down { retry_at } => {
                    tokio::time::sleep_until(*retry_at).await;
                    let token = self.current_token();
                    match Channel::connect(&self.config, &token).await {
                        Ok(channel) => {
                            // Connected is reported once the joins are acked.
                            self.state = LinkState::Up(channel);
                        }
                        Err(err) => {
                            log::warn!("Realtime connect failed: {err}");
                            self.state = LinkState::Down {
                                retry_at: Instant::now() + RECONNECT_DELAY,
                            };
                        }
                    }
                }
                LinkState::Up(channel) => match channel.next_update().await {
                    Ok(update) => return update,
                    Err(err) => {
                        log::warn!("Realtime link lost: {err}");
                        self.state = LinkState::Down {
                            retry_at: Instant::now() + RECONNECT_DELAY,
                        };
                        return FeedUpdate::Disconnected(err.to_string());
                    }
                },
            }
        }
    }

    /// Publish a typing ping if the link is up; quietly drop it otherwise.
    pub async fn publish_typing(&mut self, ping: &TypingPing) {
        if let LinkState::Up(channel) = &mut self.state {
            if let Err(err) = channel.publish_typing(ping).await {
                log::debug!("Dropped typing ping: {err}");
            }
        }
    }

    /// Tell joined channels about a new access token, or its loss.
    pub async fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
        let token = self.current_token();
        if let LinkState::Up(channel) = &mut self.state {
            if let Err(err) = channel.send_access_token(&token).await {
                log::warn!("Could not refresh channel token: {err}");
            }
        }
    }

    /// Leave the channels and close the socket. Used on shutdown.
    pub async fn shutdown(&mut self) {
        if let LinkState::Up(channel) = &mut self.state {
            channel.leave_all().await;
        }
        self.state = LinkState::Down {
            retry_at: Instant::now() + RECONNECT_DELAY,
        };
    }

    fn current_token(&self) -> String {
        self.access_token
            .clone()
            .unwrap_or_else(|| self.config.anon_key.clone())
    }
}

/// A live socket with both channels join-requested.
struct Channel {
    sink: WsSink,
    stream: WsStream,
    heartbeat: Interval,
    next_ref: u64,
    /// Ref of the heartbeat still waiting for its ack; a second tick while
    /// this is set means the link is dead.
    pending_heartbeat: Option<String>,
    /// Join refs still waiting for their `phx_reply`.
    pending_joins: HashSet<String>,
}

impl Channel {
    async fn connect(config: &AppConfig, access_token: &str) -> Result<Self, Error> {
        let (socket, _response) = connect_async(config.realtime_url()).await?;
        let (sink, stream) = socket.split();

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut channel = Self {
            sink,
            stream,
            heartbeat,
            next_ref: 0,
            pending_heartbeat: None,
            pending_joins: HashSet::new(),
        };
        for topic in [MESSAGES_TOPIC, TYPING_TOPIC] {
            let reference = channel.take_ref();
            channel.pending_joins.insert(reference.to_string());
            send_frame(&mut channel.sink, &join_frame(topic, access_token, reference)).await?;
        }
        Ok(channel)
    }

    /// Wait for the next meaningful event on the link.
    async fn next_update(&mut self) -> Result<FeedUpdate, Error> {
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => {
                    if self.pending_heartbeat.is_some() {
                        return Err(Error::Realtime("heartbeat went unanswered".to_string()));
                    }
                    let reference = self.take_ref();
                    self.pending_heartbeat = Some(reference.to_string());
                    send_frame(&mut self.sink, &heartbeat_frame(reference)).await?;
                }
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(update) = self.handle_frame(&text)? {
                                return Ok(update);
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            self.sink.send(WsMessage::Pong(payload)).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            return Err(Error::Realtime("server closed the connection".to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                        None => return Err(Error::Realtime("socket closed".to_string())),
                    }
                }
            }
        }
    }

    async fn publish_typing(&mut self, ping: &TypingPing) -> Result<(), Error> {
        let reference = self.take_ref();
        send_frame(&mut self.sink, &typing_frame(ping, reference)).await
    }

    async fn send_access_token(&mut self, access_token: &str) -> Result<(), Error> {
        for topic in [MESSAGES_TOPIC, TYPING_TOPIC] {
            let reference = self.take_ref();
            send_frame(
                &mut self.sink,
                &access_token_frame(topic, access_token, reference),
            )
            .await?;
        }
        Ok(())
    }

    async fn leave_all(&mut self) {
        for topic in [MESSAGES_TOPIC, TYPING_TOPIC] {
            let reference = self.take_ref();
            if let Err(err) = send_frame(&mut self.sink, &leave_frame(topic, reference)).await {
                log::debug!("Could not leave {topic}: {err}");
                return;
            }
        }
        if let Err(err) = self.sink.close().await {
            log::debug!("Websocket close failed: {err}");
        }
    }

    fn take_ref(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    /// Decode one text frame. `Ok(None)` means it carried nothing we act
    /// on; `Err` means the link is no longer usable.
    fn handle_frame(&mut self, text: &str) -> Result<Option<FeedUpdate>, Error> {
        let frame: SocketMessage = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("Ignoring unparseable realtime frame: {err}");
                return Ok(None);
            }
        };
        match frame.event.as_str() {
            "postgres_changes" => Ok(decode_insert(&frame.payload).map(FeedUpdate::MessageInserted)),
            "broadcast" => Ok(decode_typing(&frame.payload).map(FeedUpdate::Typing)),
            "phx_reply" => self.handle_reply(&frame),
            "phx_error" => Err(Error::Realtime(format!("channel {} errored", frame.topic))),
            "phx_close" => Err(Error::Realtime(format!("channel {} closed", frame.topic))),
            "system" => {
                log::debug!("Realtime system message: {}", frame.payload);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn handle_reply(&mut self, frame: &SocketMessage) -> Result<Option<FeedUpdate>, Error> {
        let Some(reference) = frame.reference.as_deref() else {
            return Ok(None);
        };

        if frame.topic == PHOENIX_TOPIC {
            if self.pending_heartbeat.as_deref() == Some(reference) {
                self.pending_heartbeat = None;
            }
            return Ok(None);
        }

        if self.pending_joins.remove(reference) {
            let status = frame
                .payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("");
            if status != "ok" {
                return Err(Error::Realtime(format!("join of {} rejected", frame.topic)));
            }
            if self.pending_joins.is_empty() {
                return Ok(Some(FeedUpdate::Connected));
            }
        }
        Ok(None)
    }
}

async fn send_frame(sink: &mut WsSink, frame: &SocketMessage) -> Result<(), Error> {
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

fn join_frame(topic: &str, access_token: &str, reference: u64) -> SocketMessage {
    let postgres_changes = if topic == MESSAGES_TOPIC {
        json!([{ "event": "INSERT", "schema": "public", "table": "messages" }])
    } else {
        json!([])
    };
    SocketMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": postgres_changes,
                "private": false,
            },
            "access_token": access_token,
        }),
        reference: Some(reference.to_string()),
    }
}

fn heartbeat_frame(reference: u64) -> SocketMessage {
    SocketMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

fn access_token_frame(topic: &str, access_token: &str, reference: u64) -> SocketMessage {
    SocketMessage {
        topic: topic.to_string(),
        event: "access_token".to_string(),
        payload: json!({ "access_token": access_token }),
        reference: Some(reference.to_string()),
    }
}

fn typing_frame(ping: &TypingPing, reference: u64) -> SocketMessage {
    SocketMessage {
        topic: TYPING_TOPIC.to_string(),
        event: "broadcast".to_string(),
        payload: json!({
            "type": "broadcast",
            "event": TYPING_EVENT,
            "payload": ping,
        }),
        reference: Some(reference.to_string()),
    }
}

fn leave_frame(topic: &str, reference: u64) -> SocketMessage {
    SocketMessage {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Pull the inserted row out of a `postgres_changes` payload.
fn decode_insert(payload: &Value) -> Option<Message> {
    let data = payload.get("data")?;
    if data.get("type").and_then(Value::as_str) != Some("INSERT") {
        return None;
    }
    serde_json::from_value(data.get("record")?.clone()).ok()
}

/// Pull a typing ping out of a `broadcast` payload.
fn decode_typing(payload: &Value) -> Option<TypingPing> {
    if payload.get("event").and_then(Value::as_str) != Some(TYPING_EVENT) {
        return None;
    }
    serde_json::from_value(payload.get("payload")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame_subscribes_messages_to_inserts() {
        let frame = join_frame(MESSAGES_TOPIC, "jwt", 1);
        assert_eq!(frame.topic, "realtime:messages");
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.reference.as_deref(), Some("1"));
        assert_eq!(frame.payload["access_token"], "jwt");

        let changes = &frame.payload["config"]["postgres_changes"];
        assert_eq!(changes[0]["event"], "INSERT");
        assert_eq!(changes[0]["schema"], "public");
        assert_eq!(changes[0]["table"], "messages");
    }

    #[test]
    fn test_typing_channel_join_skips_own_broadcasts() {
        let frame = join_frame(TYPING_TOPIC, "jwt", 2);
        assert_eq!(frame.payload["config"]["broadcast"]["self"], false);
        assert_eq!(
            frame.payload["config"]["postgres_changes"],
            serde_json::json!([])
        );
    }

    #[test]
    fn test_frames_serialize_ref_not_reference() {
        let text = serde_json::to_string(&heartbeat_frame(7)).unwrap();
        assert!(text.contains("\"ref\":\"7\""));
        assert!(!text.contains("reference"));

        let frame: SocketMessage = serde_json::from_str(
            r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"7"}"#,
        )
        .unwrap();
        assert_eq!(frame.reference.as_deref(), Some("7"));
    }

    #[test]
    fn test_typing_frame_wraps_the_ping() {
        let ping = TypingPing {
            user_id: "u1".to_string(),
            username: "ada".to_string(),
        };
        let frame = typing_frame(&ping, 3);
        assert_eq!(frame.topic, "realtime:typing");
        assert_eq!(frame.event, "broadcast");
        assert_eq!(frame.payload["event"], "typing");
        assert_eq!(frame.payload["payload"]["user_id"], "u1");
        assert_eq!(frame.payload["payload"]["username"], "ada");
    }

    #[test]
    fn test_decode_insert_reads_the_new_row() {
        let payload = serde_json::json!({
            "ids": [1],
            "data": {
                "type": "INSERT",
                "table": "messages",
                "record": {
                    "id": "m1",
                    "user_id": "u1",
                    "content": "hello",
                    "created_at": "2024-05-01T12:00:00Z",
                    "username": "ada",
                },
            },
        });
        let message = decode_insert(&payload).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.content, "hello");
        assert_eq!(message.display_name(), "ada");
    }

    #[test]
    fn test_decode_insert_ignores_other_changes() {
        let payload = serde_json::json!({
            "data": { "type": "UPDATE", "record": {} },
        });
        assert!(decode_insert(&payload).is_none());
        assert!(decode_insert(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_decode_typing_filters_on_the_event_name() {
        let payload = serde_json::json!({
            "event": "typing",
            "payload": { "user_id": "u2", "username": "bob" },
        });
        let ping = decode_typing(&payload).unwrap();
        assert_eq!(ping.user_id, "u2");

        let other = serde_json::json!({
            "event": "presence",
            "payload": { "user_id": "u2", "username": "bob" },
        });
        assert!(decode_typing(&other).is_none());
    }
}
