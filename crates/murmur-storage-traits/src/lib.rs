//! Murmur storage - collaborator traits and record types for the direct-message
//! synchronization engine.
//!
//! The engine never talks to a database or a socket directly. It consumes two
//! collaborators:
//!
//! - [`MessageBackend`]: the durable message history (fetch, create, mark read,
//!   unread count, conversation directory, profiles).
//! - [`PushTransport`]: a live subscription scoped to one user that delivers
//!   message-creation events and channel status changes.
//!
//! Implementations live in `murmur-memory-storage` (in-process, used by tests)
//! and `murmur-remote` (HTTP + realtime websocket).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod backend;
pub mod error;
pub mod ids;
pub mod push;
pub mod timestamp;
pub mod types;

pub use backend::MessageBackend;
pub use error::{BackendError, PushError};
pub use ids::{MessageId, UserId};
pub use push::{
    ChannelStatus, PushDirection, PushEvent, PushSignal, PushSubscription, PushTransport,
    SubscriptionId,
};
pub use types::{Contact, ConversationSummary, Message, Profile};
