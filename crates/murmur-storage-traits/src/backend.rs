//! Durable message history
//!
//! The backend is the source of truth for message ids, timestamps, read flags
//! and unread counts. The engine only ever replaces its local copies with what
//! the backend returns.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::ids::{MessageId, UserId};
use crate::types::{Contact, ConversationSummary, Message, Profile};

/// Durable collaborator consumed by the sync engine
#[async_trait]
pub trait MessageBackend: Send + Sync {
    /// Full history between `user` and `peer`, oldest first
    async fn fetch_conversation(
        &self,
        user: &UserId,
        peer: &UserId,
    ) -> Result<Vec<Message>, BackendError>;

    /// Create a message. The returned record carries the assigned id and
    /// timestamp.
    ///
    /// Fails with [`BackendError::Validation`] on empty content or a
    /// self-addressed message, and with [`BackendError::Auth`] if `sender` is
    /// not the authenticated identity.
    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<Message, BackendError>;

    /// Flip a message's read flag.
    ///
    /// Fails with [`BackendError::NotFound`] if no such message exists and
    /// [`BackendError::Forbidden`] if `user` is not its receiver.
    async fn mark_read(&self, id: &MessageId, user: &UserId) -> Result<(), BackendError>;

    /// Number of messages addressed to `user` that are still unread
    async fn unread_count(&self, user: &UserId) -> Result<u64, BackendError>;

    /// Peers `user` has exchanged messages with, newest activity first
    async fn fetch_directory(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Public profile of `user`
    async fn fetch_profile(&self, user: &UserId) -> Result<Profile, BackendError>;

    /// Every registered user
    async fn list_users(&self) -> Result<Vec<Contact>, BackendError>;
}
