//! Network collaborators for the Murmur sync engine.
//!
//! - [`HttpBackend`]: the durable REST API (`/api/messages/...`, `/api/profiles`,
//!   `/api/auth/users`).
//! - [`RealtimeTransport`]: live message-creation events over a Phoenix-channel
//!   websocket.

mod http;
mod realtime;

pub use http::HttpBackend;
pub use realtime::{RealtimeConfig, RealtimeTransport};
