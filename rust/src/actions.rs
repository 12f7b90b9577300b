use murmur_storage_traits::UserId;

#[derive(Debug, Clone)]
pub enum AppAction {
    // Auth
    SignIn { user: UserId },
    SignOut,

    // Conversations
    OpenConversation { peer: UserId },
    CloseConversation,
    RefreshDirectory,

    // Composer
    SetDraft { text: String },
    SendMessage { receiver: UserId, content: String },

    // Live delivery
    Reconnect,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            // Auth
            AppAction::SignIn { .. } => "SignIn",
            AppAction::SignOut => "SignOut",

            // Conversations
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::RefreshDirectory => "RefreshDirectory",

            // Composer
            AppAction::SetDraft { .. } => "SetDraft",
            AppAction::SendMessage { .. } => "SendMessage",

            // Live delivery
            AppAction::Reconnect => "Reconnect",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
