//! Live push subscription
//!
//! A subscription is scoped to one user. Opening one returns immediately with
//! a signal stream; the channel acknowledgement arrives later as
//! [`ChannelStatus::Subscribed`]. Event payloads are deliberately loosely
//! typed: the engine validates them into [`Message`](crate::Message) records
//! itself.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PushError;
use crate::ids::UserId;

/// Handle identifying one live subscription of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which binding of the subscription matched the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushDirection {
    /// Message addressed to the subscriber
    ToSubscriber,
    /// Message authored by the subscriber (observed from another session)
    FromSubscriber,
}

/// A message-creation event as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Binding that matched
    pub direction: PushDirection,
    /// Raw message row
    pub record: serde_json::Value,
}

/// Delivery state of the underlying channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Channel acknowledged the join
    Subscribed,
    /// Channel failed; no more events will follow
    Error {
        /// Human-readable cause
        reason: String,
    },
    /// Channel was closed by the server or the transport
    Closed,
}

/// Item of a subscription's signal stream
#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    /// Status transition
    Status(ChannelStatus),
    /// Message-creation event
    Event(PushEvent),
}

/// An open subscription
#[derive(Debug)]
pub struct PushSubscription {
    /// Transport-local id, used to unsubscribe
    pub id: SubscriptionId,
    /// Signals in delivery order. The stream ends when the subscription is torn
    /// down.
    pub signals: mpsc::UnboundedReceiver<PushSignal>,
}

/// Push collaborator consumed by the sync engine
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a subscription for `user`
    async fn subscribe(&self, user: &UserId) -> Result<PushSubscription, PushError>;

    /// Tear down a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId);
}
