//! Supabase Realtime change feed over Phoenix channels.
//!
//! One WebSocket per subscription. The socket task joins
//! `realtime:{channel}` with a `postgres_changes` filter, keeps the connection
//! alive with heartbeats and translates frames into [`FeedMessage`]s until the
//! handle is released or the channel fails.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior, interval_at, sleep},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    adapters::supabase::SupabaseClient,
    app_error::{AppError, AppResult},
    domain::entities::change_event::{ChangeEvent, ChannelStatus, RawChange},
    ports::{
        auth::AuthProvider,
        change_feed::{ChangeFeed, FeedMessage, FeedScope, FeedSubscription},
    },
};

const PROTOCOL_VERSION: &str = "1.0.0";
const JOIN_REF: &str = "1";
const MESSAGE_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub join_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
        }
    }
}

pub struct SupabaseRealtimeFeed {
    client: Arc<SupabaseClient>,
    auth: Arc<dyn AuthProvider>,
    config: RealtimeConfig,
}

impl SupabaseRealtimeFeed {
    pub fn new(
        client: Arc<SupabaseClient>,
        auth: Arc<dyn AuthProvider>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            client,
            auth,
            config,
        }
    }

    fn socket_url(&self) -> AppResult<Url> {
        socket_url(self.client.base_url(), self.client.anon_key().expose_secret())
    }
}

#[async_trait]
impl ChangeFeed for SupabaseRealtimeFeed {
    async fn subscribe(&self, scope: &FeedScope) -> AppResult<FeedSubscription> {
        let url = self.socket_url()?;
        let token = self
            .auth
            .access_token()
            .await?
            .map(|t| t.expose_secret().to_string());

        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| AppError::Transport(format!("realtime connect failed: {}", e)))?;
        debug!(channel = %scope.channel, "realtime socket connected");

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();
        let _ = tx.try_send(FeedMessage::Status(ChannelStatus::Connecting));

        let join = join_message(scope, token.as_deref());
        tokio::spawn(run_socket(
            socket,
            topic(scope),
            join,
            self.config.clone(),
            tx,
            close_rx,
        ));

        Ok(FeedSubscription::new(rx, close_tx))
    }
}

fn socket_url(base: &Url, api_key: &str) -> AppResult<Url> {
    let mut url = base
        .join("realtime/v1/websocket")
        .map_err(|e| AppError::Internal(format!("invalid realtime url: {}", e)))?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Internal(format!("cannot use {} for realtime", base)))?;
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

fn topic(scope: &FeedScope) -> String {
    format!("realtime:{}", scope.channel)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference,
        }
    }

    fn to_frame(&self) -> AppResult<Message> {
        let text = serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("encode realtime message: {}", e)))?;
        Ok(Message::text(text))
    }
}

fn join_message(scope: &FeedScope, access_token: Option<&str>) -> PhoenixMessage {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "*",
                "schema": scope.schema,
                "table": scope.table,
                "filter": scope.filter(),
            }],
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    PhoenixMessage::new(&topic(scope), "phx_join", payload, Some(JOIN_REF.to_string()))
}

/// What an inbound frame means for the channel.
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Joined,
    Change(ChangeEvent),
    Failed(String),
    Closed,
    Ignored,
}

fn interpret(topic: &str, text: &str) -> AppResult<Frame> {
    let message: PhoenixMessage = serde_json::from_str(text)
        .map_err(|e| AppError::InvalidPayload(format!("invalid realtime frame: {}", e)))?;
    if message.topic != topic {
        return Ok(Frame::Ignored);
    }

    let frame = match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(JOIN_REF) => {
            match message.payload["status"].as_str() {
                Some("ok") => Frame::Joined,
                _ => Frame::Failed(reason(&message.payload["response"])),
            }
        }
        "postgres_changes" => {
            let data = &message.payload["data"];
            let decoded = serde_json::from_value::<RawChange>(data.clone())
                .map_err(|e| AppError::InvalidPayload(format!("invalid change payload: {}", e)))
                .and_then(ChangeEvent::try_from);
            match decoded {
                Ok(event) => Frame::Change(event),
                Err(err) => {
                    warn!(%topic, error = %err, "undecodable change row; refreshing anyway");
                    Frame::Change(ChangeEvent::unparsed(data))
                }
            }
        }
        "system" if message.payload["status"].as_str() == Some("error") => {
            Frame::Failed(reason(&message.payload))
        }
        "phx_error" => Frame::Failed("channel error".to_string()),
        "phx_close" => Frame::Closed,
        _ => Frame::Ignored,
    };
    Ok(frame)
}

fn reason(value: &Value) -> String {
    value["reason"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .unwrap_or("join rejected")
        .to_string()
}

async fn run_socket<S>(
    socket: S,
    topic: String,
    join: PhoenixMessage,
    config: RealtimeConfig,
    tx: mpsc::Sender<FeedMessage>,
    mut close_rx: oneshot::Receiver<()>,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = socket.split::<Message>();

    let status = match join.to_frame() {
        Ok(frame) => match write.send(frame).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "realtime join send failed");
                Some(ChannelStatus::ChannelError)
            }
        },
        Err(err) => {
            warn!(error = %err, "realtime join encode failed");
            Some(ChannelStatus::ChannelError)
        }
    };
    if let Some(status) = status {
        let _ = tx.send(FeedMessage::Status(status)).await;
        return;
    }

    let join_deadline = sleep(config.join_timeout);
    tokio::pin!(join_deadline);
    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut joined = false;
    let mut next_ref: u64 = 1;

    let final_status = loop {
        tokio::select! {
            _ = &mut close_rx => {
                let leave = PhoenixMessage::new(&topic, "phx_leave", json!({}), None);
                if let Ok(frame) = leave.to_frame() {
                    let _ = write.send(frame).await;
                }
                let _ = write.close().await;
                debug!(%topic, "realtime channel released");
                return;
            }
            _ = &mut join_deadline, if !joined => {
                warn!(%topic, "realtime join timed out");
                break ChannelStatus::TimedOut;
            }
            _ = heartbeat.tick() => {
                next_ref += 1;
                let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), Some(next_ref.to_string()));
                let sent = match beat.to_frame() {
                    Ok(frame) => write.send(frame).await.is_ok(),
                    Err(_) => false,
                };
                if !sent {
                    break ChannelStatus::ChannelError;
                }
            }
            inbound = read.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break ChannelStatus::Closed,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(%topic, error = %err, "realtime socket error");
                        break ChannelStatus::ChannelError;
                    }
                };

                let message = match interpret(&topic, text.as_str()) {
                    Ok(Frame::Joined) => {
                        joined = true;
                        info!(%topic, "realtime channel joined");
                        FeedMessage::Status(ChannelStatus::Subscribed)
                    }
                    Ok(Frame::Change(event)) => FeedMessage::Change(event),
                    Ok(Frame::Failed(reason)) => {
                        warn!(%topic, %reason, "realtime channel failed");
                        break ChannelStatus::ChannelError;
                    }
                    Ok(Frame::Closed) => break ChannelStatus::Closed,
                    Ok(Frame::Ignored) => continue,
                    Err(err) => {
                        warn!(%topic, error = %err, "dropping malformed realtime frame");
                        continue;
                    }
                };
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        }
    };

    let _ = tx.send(FeedMessage::Status(final_status)).await;
    let _ = write.close().await;
}
