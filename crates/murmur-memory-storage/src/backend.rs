//! In-memory [`MessageBackend`]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use murmur_storage_traits::{
    BackendError, Contact, ConversationSummary, Message, MessageBackend, MessageId, Profile,
    UserId,
};
use parking_lot::{Mutex, RwLock};

use crate::push::MemoryPushHub;

/// Backend operation, used to address injected failures and call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// [`MessageBackend::fetch_conversation`]
    FetchConversation,
    /// [`MessageBackend::create_message`]
    CreateMessage,
    /// [`MessageBackend::mark_read`]
    MarkRead,
    /// [`MessageBackend::unread_count`]
    UnreadCount,
    /// [`MessageBackend::fetch_directory`]
    FetchDirectory,
    /// [`MessageBackend::fetch_profile`]
    FetchProfile,
    /// [`MessageBackend::list_users`]
    ListUsers,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, Profile>,
    /// Insertion order equals creation order.
    messages: Vec<Message>,
    last_created_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Faults {
    failing_ops: HashMap<BackendOp, BackendError>,
    failing_mark_reads: HashMap<MessageId, BackendError>,
    history_delays: HashMap<UserId, Duration>,
    send_delay: Option<Duration>,
    calls: HashMap<BackendOp, usize>,
    marked: Vec<MessageId>,
}

/// A memory-based message backend.
///
/// Users must be registered before they can send. Message ids are random
/// UUIDs and creation times are strictly increasing, so two messages created
/// back to back never tie.
pub struct MemoryBackend {
    inner: RwLock<Inner>,
    faults: Mutex<Faults>,
    hub: Option<MemoryPushHub>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend that publishes nothing
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            faults: Mutex::new(Faults::default()),
            hub: None,
        }
    }

    /// Backend that publishes every created message to `hub`
    pub fn with_push(hub: MemoryPushHub) -> Self {
        Self {
            hub: Some(hub),
            ..Self::new()
        }
    }

    /// Register (or update) a user and their public profile
    pub fn register_user(&self, user: UserId, profile: Profile) {
        self.inner.write().users.insert(user, profile);
    }

    /// Store a message directly, bypassing validation and push publication.
    /// Useful to seed history that predates a test.
    pub fn seed_message(&self, message: Message) {
        let mut inner = self.inner.write();
        if inner
            .last_created_at
            .is_none_or(|last| message.created_at > last)
        {
            inner.last_created_at = Some(message.created_at);
        }
        inner.messages.push(message);
    }

    /// Make every call of `op` fail with `err` until cleared
    pub fn fail(&self, op: BackendOp, err: BackendError) {
        self.faults.lock().failing_ops.insert(op, err);
    }

    /// Undo [`MemoryBackend::fail`] for `op`
    pub fn clear_failure(&self, op: BackendOp) {
        self.faults.lock().failing_ops.remove(&op);
    }

    /// Make marking message `id` read fail with `err`
    pub fn fail_mark_read(&self, id: MessageId, err: BackendError) {
        self.faults.lock().failing_mark_reads.insert(id, err);
    }

    /// Undo [`MemoryBackend::fail_mark_read`] for `id`
    pub fn clear_mark_read_failure(&self, id: &MessageId) {
        self.faults.lock().failing_mark_reads.remove(id);
    }

    /// Delay history responses for conversations with `peer`. The response
    /// content is captured before the delay.
    pub fn set_history_delay(&self, peer: UserId, delay: Duration) {
        self.faults.lock().history_delays.insert(peer, delay);
    }

    /// Delay every create-message call by `delay`
    pub fn set_send_delay(&self, delay: Duration) {
        self.faults.lock().send_delay = Some(delay);
    }

    /// How many times `op` was invoked, failed calls included
    pub fn calls(&self, op: BackendOp) -> usize {
        self.faults.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Ids passed to successful [`MessageBackend::mark_read`] calls, in order
    pub fn marked_read(&self) -> Vec<MessageId> {
        self.faults.lock().marked.clone()
    }

    /// Snapshot of a stored message
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.inner.read().messages.iter().find(|m| &m.id == id).cloned()
    }

    fn enter(&self, op: BackendOp) -> Result<(), BackendError> {
        let mut faults = self.faults.lock();
        *faults.calls.entry(op).or_default() += 1;
        match faults.failing_ops.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_created_at(inner: &mut Inner) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match inner.last_created_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        inner.last_created_at = Some(at);
        at
    }
}

#[async_trait]
impl MessageBackend for MemoryBackend {
    async fn fetch_conversation(
        &self,
        user: &UserId,
        peer: &UserId,
    ) -> Result<Vec<Message>, BackendError> {
        self.enter(BackendOp::FetchConversation)?;
        let history: Vec<Message> = {
            let inner = self.inner.read();
            let mut history: Vec<Message> = inner
                .messages
                .iter()
                .filter(|m| m.peer_of(user) == Some(peer))
                .cloned()
                .collect();
            for m in history.iter_mut() {
                if let Some(profile) = inner.users.get(&m.sender) {
                    m.apply_sender_profile(profile);
                }
            }
            history.sort_by_key(|m| m.created_at);
            history
        };
        let delay = self.faults.lock().history_delays.get(peer).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(history)
    }

    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<Message, BackendError> {
        self.enter(BackendOp::CreateMessage)?;
        let delay = self.faults.lock().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if content.trim().is_empty() {
            return Err(BackendError::Validation("content is empty".into()));
        }
        if sender == receiver {
            return Err(BackendError::Validation(
                "cannot send a message to yourself".into(),
            ));
        }
        let message = {
            let mut inner = self.inner.write();
            if !inner.users.contains_key(sender) {
                return Err(BackendError::Auth(format!("{sender} is not signed in")));
            }
            if !inner.users.contains_key(receiver) {
                return Err(BackendError::Validation(format!(
                    "unknown receiver {receiver}"
                )));
            }
            let message = Message {
                id: MessageId::new(uuid::Uuid::new_v4().to_string()),
                sender: sender.clone(),
                receiver: receiver.clone(),
                content: content.to_string(),
                read: false,
                created_at: Self::next_created_at(&mut inner),
                sender_name: None,
                sender_avatar_url: None,
            };
            inner.messages.push(message.clone());
            message
        };
        tracing::debug!(id = %message.id, "memory backend: message created");
        if let Some(hub) = &self.hub {
            hub.publish(&message);
        }
        Ok(message)
    }

    async fn mark_read(&self, id: &MessageId, user: &UserId) -> Result<(), BackendError> {
        self.enter(BackendOp::MarkRead)?;
        if let Some(err) = self.faults.lock().failing_mark_reads.get(id) {
            return Err(err.clone());
        }
        {
            let mut inner = self.inner.write();
            let Some(message) = inner.messages.iter_mut().find(|m| &m.id == id) else {
                return Err(BackendError::NotFound(format!("message {id}")));
            };
            if !message.is_addressed_to(user) {
                return Err(BackendError::Forbidden(format!(
                    "{user} is not the receiver of {id}"
                )));
            }
            message.read = true;
        }
        self.faults.lock().marked.push(id.clone());
        Ok(())
    }

    async fn unread_count(&self, user: &UserId) -> Result<u64, BackendError> {
        self.enter(BackendOp::UnreadCount)?;
        let inner = self.inner.read();
        let count = inner
            .messages
            .iter()
            .filter(|m| m.is_addressed_to(user) && !m.read)
            .count();
        Ok(count as u64)
    }

    async fn fetch_directory(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        self.enter(BackendOp::FetchDirectory)?;
        let inner = self.inner.read();
        let mut involving: Vec<&Message> = inner
            .messages
            .iter()
            .filter(|m| m.peer_of(user).is_some())
            .collect();
        involving.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for m in involving {
            let Some(peer) = m.peer_of(user) else {
                continue;
            };
            if !seen.insert(peer.clone()) {
                continue;
            }
            let profile = inner.users.get(peer).cloned().unwrap_or_default();
            out.push(ConversationSummary {
                peer: peer.clone(),
                peer_name: profile.username,
                peer_avatar_url: profile.avatar_url,
                last_activity_at: m.created_at,
            });
        }
        Ok(out)
    }

    async fn fetch_profile(&self, user: &UserId) -> Result<Profile, BackendError> {
        self.enter(BackendOp::FetchProfile)?;
        self.inner
            .read()
            .users
            .get(user)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("profile {user}")))
    }

    async fn list_users(&self) -> Result<Vec<Contact>, BackendError> {
        self.enter(BackendOp::ListUsers)?;
        Ok(self
            .inner
            .read()
            .users
            .iter()
            .map(|(user, profile)| Contact {
                user: user.clone(),
                username: profile.username.clone(),
                avatar_url: profile.avatar_url.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (MemoryBackend, UserId, UserId) {
        let b = MemoryBackend::new();
        let ana = UserId::from("ana");
        let bob = UserId::from("bob");
        b.register_user(
            ana.clone(),
            Profile {
                username: Some("Ana".into()),
                avatar_url: None,
            },
        );
        b.register_user(bob.clone(), Profile::default());
        (b, ana, bob)
    }

    #[tokio::test]
    async fn test_create_rejects_self_and_blank() {
        let (b, ana, bob) = backend();
        assert!(matches!(
            b.create_message(&ana, &ana, "hi").await,
            Err(BackendError::Validation(_))
        ));
        assert!(matches!(
            b.create_message(&ana, &bob, "   ").await,
            Err(BackendError::Validation(_))
        ));
        assert!(matches!(
            b.create_message(&UserId::from("ghost"), &bob, "hi").await,
            Err(BackendError::Auth(_))
        ));
        assert_eq!(b.calls(BackendOp::CreateMessage), 3);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let (b, ana, bob) = backend();
        let m1 = b.create_message(&ana, &bob, "1").await.unwrap();
        let m2 = b.create_message(&bob, &ana, "2").await.unwrap();
        assert!(m2.created_at > m1.created_at);
        assert_ne!(m1.id, m2.id);
    }

    #[tokio::test]
    async fn test_mark_read_only_by_receiver() {
        let (b, ana, bob) = backend();
        let m = b.create_message(&ana, &bob, "hi").await.unwrap();
        assert_eq!(b.unread_count(&bob).await.unwrap(), 1);

        assert!(matches!(
            b.mark_read(&m.id, &ana).await,
            Err(BackendError::Forbidden(_))
        ));
        assert!(matches!(
            b.mark_read(&MessageId::from("nope"), &bob).await,
            Err(BackendError::NotFound(_))
        ));
        b.mark_read(&m.id, &bob).await.unwrap();
        assert_eq!(b.unread_count(&bob).await.unwrap(), 0);
        assert_eq!(b.marked_read(), vec![m.id]);
    }

    #[tokio::test]
    async fn test_history_is_enriched_and_ordered() {
        let (b, ana, bob) = backend();
        b.create_message(&ana, &bob, "1").await.unwrap();
        b.create_message(&bob, &ana, "2").await.unwrap();
        b.create_message(&ana, &UserId::from("carol"), "x")
            .await
            .unwrap_err();

        let history = b.fetch_conversation(&bob, &ana).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "2"]);
        assert_eq!(history[0].sender_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_directory_newest_first_one_entry_per_peer() {
        let (b, ana, bob) = backend();
        let carol = UserId::from("carol");
        b.register_user(carol.clone(), Profile::default());
        b.create_message(&ana, &bob, "1").await.unwrap();
        b.create_message(&carol, &ana, "2").await.unwrap();
        let last = b.create_message(&bob, &ana, "3").await.unwrap();

        let dir = b.fetch_directory(&ana).await.unwrap();
        let peers: Vec<_> = dir.iter().map(|s| s.peer.as_str()).collect();
        assert_eq!(peers, vec!["bob", "carol"]);
        assert_eq!(dir[0].last_activity_at, last.created_at);
    }

    #[tokio::test]
    async fn test_injected_failure_until_cleared() {
        let (b, _ana, bob) = backend();
        b.fail(BackendOp::UnreadCount, BackendError::Transient("down".into()));
        assert!(b.unread_count(&bob).await.is_err());
        b.clear_failure(BackendOp::UnreadCount);
        assert_eq!(b.unread_count(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_failure_until_cleared() {
        let (b, ana, bob) = backend();
        let m = b.create_message(&ana, &bob, "hi").await.unwrap();
        b.fail_mark_read(m.id.clone(), BackendError::Transient("flaky".into()));
        assert!(b.mark_read(&m.id, &bob).await.is_err());
        b.clear_mark_read_failure(&m.id);
        b.mark_read(&m.id, &bob).await.unwrap();
        assert_eq!(b.calls(BackendOp::MarkRead), 2);
        assert_eq!(b.marked_read(), vec![m.id]);
    }
}
