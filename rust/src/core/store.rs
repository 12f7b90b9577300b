// Messages of the open conversation, deduplicated by id and kept in
// chronological order.

use std::collections::HashSet;

use murmur_storage_traits::{Message, MessageId, Profile, UserId};

#[derive(Debug, Default)]
pub(super) struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    /// Insert unless the id is already present. Equal timestamps keep arrival
    /// order. Returns whether the store changed.
    pub(super) fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.ids.insert(message.id.clone());
        self.messages.insert(at, message);
        true
    }

    /// Insert, or fold `message` into the stored copy with the same id. A read
    /// flag set on either copy stays set, and missing sender metadata is filled
    /// in. Returns whether the store changed.
    pub(super) fn merge(&mut self, message: Message) -> bool {
        let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) else {
            return self.insert(message);
        };
        let mut changed = false;
        if message.read && !existing.read {
            existing.read = true;
            changed = true;
        }
        if let Some(profile) = message.sender_profile() {
            changed |= existing.apply_sender_profile(&profile);
        }
        changed
    }

    /// Replace the whole collection with a full-history fetch.
    pub(super) fn hydrate(&mut self, history: Vec<Message>) {
        self.clear();
        for m in history {
            self.insert(m);
        }
    }

    /// Remove and return everything, oldest first.
    pub(super) fn take(&mut self) -> Vec<Message> {
        self.ids.clear();
        std::mem::take(&mut self.messages)
    }

    pub(super) fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    /// Flip the read flag. Never flips it back.
    pub(super) fn mark_read(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(m) if !m.read => {
                m.read = true;
                true
            }
            _ => false,
        }
    }

    /// Attach `profile` to every message from `sender` that lacks metadata.
    pub(super) fn apply_sender_profile(&mut self, sender: &UserId, profile: &Profile) -> bool {
        let mut changed = false;
        for m in self.messages.iter_mut().filter(|m| &m.sender == sender) {
            changed |= m.apply_sender_profile(profile);
        }
        changed
    }

    /// Unread messages addressed to `user`, oldest first.
    pub(super) fn unread_inbound(&self, user: &UserId) -> Vec<MessageId> {
        self.messages
            .iter()
            .filter(|m| m.is_addressed_to(user) && !m.read)
            .map(|m| m.id.clone())
            .collect()
    }

    pub(super) fn senders(&self) -> HashSet<UserId> {
        self.messages.iter().map(|m| m.sender.clone()).collect()
    }

    pub(super) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(super) fn len(&self) -> usize {
        self.messages.len()
    }
}
