//! Phoenix-channel realtime client.
//!
//! One websocket per subscription. The channel joins with two `postgres_changes`
//! INSERT bindings on `public.messages`, one filtered by receiver and one by
//! sender, and keeps itself alive with heartbeats on the `phoenix` topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use murmur_storage_traits::{
    ChannelStatus, PushDirection, PushError, PushEvent, PushSignal, PushSubscription,
    PushTransport, SubscriptionId, UserId,
};
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

const JOIN_REF: &str = "1";

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Websocket endpoint, e.g. `wss://project.example.co/realtime/v1`
    pub url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
}

/// [`PushTransport`] over a Phoenix-channel websocket.
pub struct RealtimeTransport {
    config: RealtimeConfig,
    next_id: AtomicU64,
    stops: Mutex<HashMap<SubscriptionId, oneshot::Sender<()>>>,
}

#[derive(Debug, Serialize)]
struct OutFrame<'a> {
    topic: &'a str,
    event: &'a str,
    payload: Value,
    #[serde(rename = "ref")]
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    join_ref: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl RealtimeTransport {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            stops: Mutex::new(HashMap::new()),
        }
    }

    fn socket_url(&self) -> Result<Url, PushError> {
        let base = self.config.url.trim_end_matches('/');
        let base = if base.ends_with("/websocket") {
            base.to_string()
        } else {
            format!("{base}/websocket")
        };
        let mut url = Url::parse(&base).map_err(|e| PushError::Connect(format!("{base}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.config.api_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

/// Channel topic for `user`
pub(crate) fn topic_for(user: &UserId) -> String {
    let safe: String = user
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("realtime:messages-{safe}")
}

pub(crate) fn join_payload(user: &UserId, access_token: Option<&str>) -> Value {
    let binding = |column: &str| {
        json!({
            "event": "INSERT",
            "schema": "public",
            "table": "messages",
            "filter": format!("{column}=eq.{}", user.as_str()),
        })
    };
    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [binding("receiver_email"), binding("sender_email")],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    payload
}

/// Translate one server frame into a signal for the subscriber. Frames that
/// carry nothing for the subscriber (heartbeat replies, presence, system
/// notices) yield `None`.
pub(crate) fn parse_frame(text: &str, topic: &str, user: &UserId) -> Option<PushSignal> {
    let frame: InFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(%e, "realtime: unparseable frame");
            return None;
        }
    };
    if frame.topic != topic {
        return None;
    }
    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Some(PushSignal::Status(ChannelStatus::Subscribed)),
                _ => Some(PushSignal::Status(ChannelStatus::Error {
                    reason: frame
                        .payload
                        .get("response")
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "join failed".to_string()),
                })),
            }
        }
        "postgres_changes" => {
            let record = frame.payload.get("data")?.get("record")?.clone();
            let sent_by_me = record.get("sender_email").and_then(Value::as_str) == Some(user.as_str());
            let direction = if sent_by_me {
                PushDirection::FromSubscriber
            } else {
                PushDirection::ToSubscriber
            };
            Some(PushSignal::Event(PushEvent { direction, record }))
        }
        "phx_error" => Some(PushSignal::Status(ChannelStatus::Error {
            reason: "channel error".to_string(),
        })),
        "phx_close" => Some(PushSignal::Status(ChannelStatus::Closed)),
        _ => None,
    }
}

fn encode(topic: &str, event: &str, payload: Value, reference: u64, join: bool) -> WsMessage {
    let frame = OutFrame {
        topic,
        event,
        payload,
        reference: reference.to_string(),
        join_ref: join.then_some(JOIN_REF),
    };
    // Serializing plain JSON values cannot fail.
    let text = serde_json::to_string(&frame).unwrap_or_default();
    WsMessage::Text(text.into())
}

fn is_terminal(signal: &PushSignal) -> bool {
    matches!(
        signal,
        PushSignal::Status(ChannelStatus::Error { .. } | ChannelStatus::Closed)
    )
}

#[async_trait]
impl PushTransport for RealtimeTransport {
    async fn subscribe(&self, user: &UserId) -> Result<PushSubscription, PushError> {
        let url = self.socket_url()?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let topic = topic_for(user);
        let payload = join_payload(user, self.config.access_token.as_deref());
        sink.send(encode(&topic, "phx_join", payload, 1, true))
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stops.lock().insert(id, stop_tx);

        let user = user.clone();
        let heartbeat = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            ticker.tick().await;
            let mut next_ref = 2u64;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        let _ = sink.send(encode(&topic, "phx_leave", json!({}), next_ref, true)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    _ = tx.closed() => {
                        let _ = sink.close().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        let beat = encode("phoenix", "heartbeat", json!({}), next_ref, false);
                        next_ref += 1;
                        if let Err(e) = sink.send(beat).await {
                            let _ = tx.send(PushSignal::Status(ChannelStatus::Error {
                                reason: format!("heartbeat failed: {e}"),
                            }));
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            let Some(signal) = parse_frame(text.as_str(), &topic, &user) else {
                                continue;
                            };
                            let terminal = is_terminal(&signal);
                            if tx.send(signal).is_err() || terminal {
                                let _ = sink.close().await;
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            let _ = tx.send(PushSignal::Status(ChannelStatus::Closed));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = tx.send(PushSignal::Status(ChannelStatus::Error {
                                reason: e.to_string(),
                            }));
                            break;
                        }
                    }
                }
            }
            tracing::debug!(%id, "realtime: channel task finished");
        });

        Ok(PushSubscription { id, signals: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(stop) = self.stops.lock().remove(&id) {
            let _ = stop.send(());
        }
    }
}
