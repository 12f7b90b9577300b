use murmur_storage_traits::{
    BackendError, Contact, ConversationSummary, Message, MessageId, Profile, PushError,
    PushSignal, SubscriptionId, UserId,
};

use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async work, reported back to the actor.
///
/// `epoch` identifies the signed-in session the work was started for; results
/// from an earlier session are dropped.
#[derive(Debug)]
pub enum InternalEvent {
    // Push subscription
    SubscriptionOpened {
        token: u64,
        id: SubscriptionId,
    },
    SubscriptionFailed {
        token: u64,
        error: PushError,
    },
    Push {
        token: u64,
        signal: PushSignal,
    },

    // Hydration
    HistoryLoaded {
        token: u64,
        peer: UserId,
        result: Result<Vec<Message>, BackendError>,
    },

    // Send
    SendFinished {
        epoch: u64,
        receiver: UserId,
        result: Result<Message, BackendError>,
    },

    // Read marking
    MarkedRead {
        epoch: u64,
        id: MessageId,
    },
    MarkFailed {
        epoch: u64,
        id: MessageId,
    },
    ReadMarkingFinished {
        epoch: u64,
    },

    // Background refreshes
    UnreadFetched {
        epoch: u64,
        seq: u64,
        result: Result<u64, BackendError>,
    },
    DirectoryFetched {
        epoch: u64,
        result: Result<Vec<ConversationSummary>, BackendError>,
    },
    ContactsFetched {
        epoch: u64,
        result: Result<Vec<Contact>, BackendError>,
    },
    ProfileResolved {
        epoch: u64,
        user: UserId,
        profile: Option<Profile>,
    },
}
