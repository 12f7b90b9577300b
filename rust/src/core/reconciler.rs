// Folds live push signals into the store, directory and unread tracker.

use murmur_storage_traits::{ChannelStatus, Message, PushDirection, PushEvent, PushSignal, UserId};

use super::*;

#[derive(Debug, PartialEq)]
pub(super) enum Classified {
    /// Addressed to the signed-in user.
    Inbound(Message),
    /// Authored by the signed-in user, observed through the channel.
    Outbound(Message),
}

#[derive(Debug, PartialEq)]
pub(super) enum Dropped {
    Malformed(String),
    /// Neither party is the signed-in user.
    Unrelated,
}

/// Validate a raw event and classify it against `me`. The record decides, the
/// transport's direction tag is advisory.
pub(super) fn classify(event: &PushEvent, me: &UserId) -> Result<Classified, Dropped> {
    let message: Message = serde_json::from_value(event.record.clone())
        .map_err(|e| Dropped::Malformed(e.to_string()))?;
    if message.id.as_str().is_empty() {
        return Err(Dropped::Malformed("empty id".into()));
    }
    let classified = if message.is_addressed_to(me) {
        Classified::Inbound(message)
    } else if message.is_sent_by(me) {
        Classified::Outbound(message)
    } else {
        return Err(Dropped::Unrelated);
    };
    let expected = match &classified {
        Classified::Inbound(_) => PushDirection::ToSubscriber,
        Classified::Outbound(_) => PushDirection::FromSubscriber,
    };
    if event.direction != expected {
        tracing::debug!(?expected, got = ?event.direction, "push direction tag mismatch");
    }
    Ok(classified)
}

impl AppCore {
    pub(super) fn handle_push_signal(&mut self, token: u64, signal: PushSignal) {
        if self.session.as_ref().map(|s| s.sub_token) != Some(token) {
            tracing::debug!(token, "push signal from stale subscription dropped");
            return;
        }
        match signal {
            PushSignal::Status(status) => self.handle_channel_status(status),
            PushSignal::Event(event) => {
                if !self.state.subscription.is_live() {
                    tracing::debug!("push event outside subscribed state dropped");
                    return;
                }
                self.handle_push_event(event);
            }
        }
    }

    fn handle_channel_status(&mut self, status: ChannelStatus) {
        let next = match status {
            ChannelStatus::Subscribed => SubscriptionState::Subscribed,
            ChannelStatus::Error { reason } => SubscriptionState::Error { reason },
            ChannelStatus::Closed => SubscriptionState::Closed,
        };
        if next.is_terminal() {
            if let Some(sess) = self.session.as_mut() {
                sess.stop_subscription(&self.runtime, self.push.clone());
            }
        }
        self.set_subscription(next);
    }

    fn handle_push_event(&mut self, event: PushEvent) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        match classify(&event, &me) {
            Ok(Classified::Inbound(message)) => self.on_inbound(message),
            Ok(Classified::Outbound(message)) => self.on_outbound_observed(message),
            Err(Dropped::Malformed(reason)) => {
                tracing::warn!(%reason, "malformed push payload dropped");
            }
            Err(Dropped::Unrelated) => {
                tracing::debug!("push payload for other users dropped");
            }
        }
    }

    fn on_inbound(&mut self, mut message: Message) {
        tracing::info!(id = %message.id, sender = %message.sender, "inbound message");
        let from_open_peer = self.state.open_peer() == Some(&message.sender);
        if !from_open_peer {
            // Body stays on the server until that conversation is opened.
            self.touch_directory(&message.sender, message.created_at);
            self.refresh_unread();
            self.refresh_directory();
            return;
        }

        let now = std::time::Instant::now();
        if let Some(profile) = self.profiles.get(&message.sender, now) {
            message.apply_sender_profile(profile);
        }
        let needs_profile = !message.has_sender_metadata();
        let sender = message.sender.clone();
        let id = message.id.clone();
        let at = message.created_at;
        let unread = !message.read;
        if self.store.insert(message) {
            self.sync_current_conversation();
        }
        if needs_profile {
            self.resolve_sender_profile(&sender);
        }
        self.touch_directory(&sender, at);
        if unread {
            // The unread refresh follows the mark.
            self.mark_messages_read(vec![id]);
        } else {
            self.refresh_unread();
        }
    }

    fn on_outbound_observed(&mut self, message: Message) {
        tracing::debug!(id = %message.id, receiver = %message.receiver, "outbound message observed");
        let receiver = message.receiver.clone();
        let at = message.created_at;
        if self.state.open_peer() == Some(&receiver) && self.store.insert(message) {
            self.sync_current_conversation();
        }
        self.touch_directory(&receiver, at);
    }
}
