use murmur_storage_traits::{Contact, ConversationSummary, Message, UserId};

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub subscription: SubscriptionState,
    pub busy: BusyState,
    pub directory: Vec<ConversationSummary>,
    pub contacts: Vec<Contact>,
    pub current_conversation: Option<ConversationViewState>,
    pub unread_count: u64,
    pub composer: ComposerState,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            subscription: SubscriptionState::Unsubscribed,
            busy: BusyState::idle(),
            directory: vec![],
            contacts: vec![],
            current_conversation: None,
            unread_count: 0,
            composer: ComposerState::default(),
            toast: None,
        }
    }

    pub fn signed_in_user(&self) -> Option<&UserId> {
        match &self.auth {
            AuthState::LoggedIn { user } => Some(user),
            AuthState::LoggedOut => None,
        }
    }

    pub fn open_peer(&self) -> Option<&UserId> {
        self.current_conversation.as_ref().map(|c| &c.peer)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user: UserId },
}

/// Live delivery state of the signed-in user's push subscription.
///
/// `Unsubscribed -> Subscribing -> Subscribed -> (Error | Closed)`. A fresh
/// subscription (reconnect) may start from `Error` or `Closed`, and tearing a
/// session down returns to `Unsubscribed` from anywhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Error { reason: String },
    Closed,
}

impl SubscriptionState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Subscribed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Closed)
    }

    pub fn can_transition_to(&self, next: &SubscriptionState) -> bool {
        use SubscriptionState::*;
        match (self, next) {
            (_, Unsubscribed) => true,
            (Unsubscribed, Subscribing) => true,
            (Error { .. } | Closed, Subscribing) => true,
            (Subscribing, Subscribed | Error { .. } | Closed) => true,
            (Subscribed, Error { .. } | Closed) => true,
            _ => false,
        }
    }
}

/// "In flight" flags for operations the UI should reflect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_history: bool,
    pub refreshing_directory: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_history: false,
            refreshing_directory: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationViewState {
    pub peer: UserId,
    pub peer_name: Option<String>,
    pub peer_avatar_url: Option<String>,
    /// Oldest first.
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposerState {
    pub draft: String,
    pub sending: bool,
    pub error: Option<String>,
}
