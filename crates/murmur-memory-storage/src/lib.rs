//! Memory-based implementation of the Murmur collaborator traits.
//!
//! [`MemoryBackend`] implements [`MessageBackend`] and [`MemoryPushHub`]
//! implements [`PushTransport`]. A backend built with
//! [`MemoryBackend::with_push`] publishes every created message to the hub,
//! the same way the hosted database feeds its realtime service.
//!
//! Nothing is persisted. Both types expose fault-injection hooks so tests can
//! reproduce the failure modes the engine must tolerate: failing calls, slow
//! history responses, rejected or dropped channels and malformed payloads.
//!
//! ```rust
//! use murmur_memory_storage::{MemoryBackend, MemoryPushHub};
//! use murmur_storage_traits::{Profile, UserId};
//!
//! let hub = MemoryPushHub::new();
//! let backend = MemoryBackend::with_push(hub.clone());
//! backend.register_user(UserId::from("ana@example.com"), Profile::default());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod push;

pub use self::backend::{BackendOp, MemoryBackend};
pub use self::push::MemoryPushHub;
