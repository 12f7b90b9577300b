//! In-memory [`PushTransport`]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use murmur_storage_traits::{
    ChannelStatus, Message, PushDirection, PushError, PushEvent, PushSignal, PushSubscription,
    PushTransport, SubscriptionId, UserId,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct Channel {
    user: UserId,
    tx: mpsc::UnboundedSender<PushSignal>,
}

#[derive(Default)]
struct HubState {
    channels: BTreeMap<SubscriptionId, Channel>,
    refuse: Option<PushError>,
    hold_acks: bool,
}

/// A process-local push hub. Cloning shares the same hub.
///
/// New subscriptions are acknowledged immediately unless
/// [`MemoryPushHub::hold_acks`] is set.
#[derive(Clone, Default)]
pub struct MemoryPushHub {
    state: Arc<Mutex<HubState>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryPushHub {
    /// Empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every channel of its sender and receiver
    pub fn publish(&self, message: &Message) {
        let record = match serde_json::to_value(message) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%e, "memory hub: failed to encode message");
                return;
            }
        };
        let state = self.state.lock();
        for channel in state.channels.values() {
            let direction = if message.is_addressed_to(&channel.user) {
                PushDirection::ToSubscriber
            } else if message.is_sent_by(&channel.user) {
                PushDirection::FromSubscriber
            } else {
                continue;
            };
            let _ = channel.tx.send(PushSignal::Event(PushEvent {
                direction,
                record: record.clone(),
            }));
        }
    }

    /// Deliver an arbitrary payload to every channel of `user`
    pub fn inject_raw(&self, user: &UserId, direction: PushDirection, record: serde_json::Value) {
        self.inject(
            user,
            PushSignal::Event(PushEvent {
                direction,
                record,
            }),
        );
    }

    /// Deliver `signal` to every channel of `user`
    pub fn inject(&self, user: &UserId, signal: PushSignal) {
        let state = self.state.lock();
        for channel in state.channels.values().filter(|c| &c.user == user) {
            let _ = channel.tx.send(signal.clone());
        }
    }

    /// Fail every channel of `user` and drop them
    pub fn fail_channels(&self, user: &UserId, reason: &str) {
        self.terminate(
            user,
            ChannelStatus::Error {
                reason: reason.to_string(),
            },
        );
    }

    /// Close every channel of `user` from the server side
    pub fn close_channels(&self, user: &UserId) {
        self.terminate(user, ChannelStatus::Closed);
    }

    /// Make subsequent subscribe calls fail with `err` (or succeed again on
    /// `None`)
    pub fn refuse_subscriptions(&self, err: Option<PushError>) {
        self.state.lock().refuse = err;
    }

    /// Withhold the acknowledgement of new subscriptions
    pub fn hold_acks(&self, hold: bool) {
        self.state.lock().hold_acks = hold;
    }

    /// Acknowledge every open channel of `user`
    pub fn ack(&self, user: &UserId) {
        self.inject(user, PushSignal::Status(ChannelStatus::Subscribed));
    }

    /// Number of open channels of `user`
    pub fn active_subscriptions(&self, user: &UserId) -> usize {
        self.state
            .lock()
            .channels
            .values()
            .filter(|c| &c.user == user)
            .count()
    }

    fn terminate(&self, user: &UserId, status: ChannelStatus) {
        let mut state = self.state.lock();
        state.channels.retain(|_, channel| {
            if &channel.user != user {
                return true;
            }
            let _ = channel.tx.send(PushSignal::Status(status.clone()));
            false
        });
    }
}

#[async_trait]
impl PushTransport for MemoryPushHub {
    async fn subscribe(&self, user: &UserId) -> Result<PushSubscription, PushError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.refuse {
            return Err(err.clone());
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        if !state.hold_acks {
            let _ = tx.send(PushSignal::Status(ChannelStatus::Subscribed));
        }
        state.channels.insert(
            id,
            Channel {
                user: user.clone(),
                tx,
            },
        );
        tracing::debug!(%id, %user, "memory hub: subscribed");
        Ok(PushSubscription { id, signals: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if self.state.lock().channels.remove(&id).is_some() {
            tracing::debug!(%id, "memory hub: unsubscribed");
        }
    }
}
