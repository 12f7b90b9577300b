//! Record types shared by the engine and its collaborators
//!
//! Field names on the wire follow the hosted backend (`sender_email`,
//! `last_message_at`, ...); the Rust names describe the role instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{MessageId, UserId};

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Id assigned by the durable store
    pub id: MessageId,
    /// Author
    #[serde(rename = "sender_email")]
    pub sender: UserId,
    /// Addressee
    #[serde(rename = "receiver_email")]
    pub receiver: UserId,
    /// Text body
    pub content: String,
    /// Read flag, meaningful from the receiver's perspective
    #[serde(default, deserialize_with = "null_as_false")]
    pub read: bool,
    /// Creation time, assigned by the durable store
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    /// Denormalized sender display name, resolved after receipt
    #[serde(
        default,
        rename = "sender_username",
        skip_serializing_if = "Option::is_none"
    )]
    pub sender_name: Option<String>,
    /// Denormalized sender avatar, resolved after receipt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar_url: Option<String>,
}

impl Message {
    /// Whether `user` is the addressee
    pub fn is_addressed_to(&self, user: &UserId) -> bool {
        &self.receiver == user
    }

    /// Whether `user` is the author
    pub fn is_sent_by(&self, user: &UserId) -> bool {
        &self.sender == user
    }

    /// The other party of the conversation, seen from `user`.
    /// Returns `None` when `user` takes no part in the message.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.sender == user {
            Some(&self.receiver)
        } else if &self.receiver == user {
            Some(&self.sender)
        } else {
            None
        }
    }

    /// Whether any sender display metadata has been attached
    pub fn has_sender_metadata(&self) -> bool {
        self.sender_name.is_some() || self.sender_avatar_url.is_some()
    }

    /// Sender metadata carried by this message, if any
    pub fn sender_profile(&self) -> Option<Profile> {
        if !self.has_sender_metadata() {
            return None;
        }
        Some(Profile {
            username: self.sender_name.clone(),
            avatar_url: self.sender_avatar_url.clone(),
        })
    }

    /// Attach resolved sender metadata. Fields that are already set are kept.
    /// Returns `true` when anything changed.
    pub fn apply_sender_profile(&mut self, profile: &Profile) -> bool {
        let mut changed = false;
        if self.sender_name.is_none() && profile.username.is_some() {
            self.sender_name = profile.username.clone();
            changed = true;
        }
        if self.sender_avatar_url.is_none() && profile.avatar_url.is_some() {
            self.sender_avatar_url = profile.avatar_url.clone();
            changed = true;
        }
        changed
    }
}

/// Public profile data of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    #[serde(default)]
    pub username: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// A profile with neither name nor avatar
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none()
    }
}

/// One entry of a user's conversation directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The other party
    #[serde(rename = "email")]
    pub peer: UserId,
    /// Peer display name
    #[serde(default, rename = "username")]
    pub peer_name: Option<String>,
    /// Peer avatar
    #[serde(default, rename = "avatar_url")]
    pub peer_avatar_url: Option<String>,
    /// Time of the newest message exchanged with the peer
    #[serde(rename = "last_message_at", with = "crate::timestamp")]
    pub last_activity_at: DateTime<Utc>,
}

/// A user the signed-in user may start a conversation with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Identity
    #[serde(rename = "email")]
    pub user: UserId,
    /// Display name
    #[serde(default)]
    pub username: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Contact {
    /// Profile view of this contact
    pub fn profile(&self) -> Profile {
        Profile {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
