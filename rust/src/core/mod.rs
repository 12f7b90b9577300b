mod config;
mod conversation;
mod directory;
mod profile;
mod read_marking;
mod reconciler;
mod send;
mod session;
mod store;
mod unread;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;
use murmur_storage_traits::{
    BackendError, Contact, MessageBackend, Profile, PushError, PushTransport, UserId,
};

use crate::actions::AppAction;
use crate::state::{
    AuthState, BusyState, ComposerState, ConversationViewState, SubscriptionState,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::read_config;
pub use config::{load_config, MurmurConfig};

pub struct AppCore {
    pub state: crate::state::AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<crate::state::AppState>>,

    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn MessageBackend>,
    push: Arc<dyn PushTransport>,

    session: Option<session::Session>,
    // Bumped whenever the signed-in identity changes; async results tagged with
    // an older epoch are dropped.
    epoch: u64,
    sub_seq: u64,
    hydrate_token: u64,

    store: store::MessageStore,
    directory: directory::Directory,
    unread: unread::UnreadTracker,
    profiles: profile::ProfileCache,
    read_marker: read_marking::ReadMarker,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        config: &MurmurConfig,
        shared_state: Arc<RwLock<crate::state::AppState>>,
        runtime: tokio::runtime::Runtime,
        backend: Arc<dyn MessageBackend>,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        let this = Self {
            state: crate::state::AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            runtime,
            backend,
            push,
            session: None,
            epoch: 0,
            sub_seq: 0,
            hydrate_token: 0,
            store: store::MessageStore::default(),
            directory: directory::Directory::default(),
            unread: unread::UnreadTracker::default(),
            profiles: profile::ProfileCache::new(config.profile_cache_ttl()),
            read_marker: read_marking::ReadMarker::default(),
        };

        // Ensure MurmurApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &crate::state::AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Stays in state until the UI clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Auth
            AppAction::SignIn { user } => {
                let user = UserId::new(user.as_str().trim());
                if user.as_str().is_empty() {
                    self.toast("Enter a user id");
                    return;
                }
                if self.state.signed_in_user() == Some(&user) {
                    tracing::debug!(user = %user, "already signed in");
                    return;
                }
                self.start_session(user);
            }
            AppAction::SignOut => self.stop_session(),

            // Conversations
            AppAction::OpenConversation { peer } => self.open_conversation(peer),
            AppAction::CloseConversation => self.close_conversation(),
            AppAction::RefreshDirectory => self.refresh_directory(),

            // Composer
            AppAction::SetDraft { text } => self.set_draft(text),
            AppAction::SendMessage { receiver, content } => self.send_message(receiver, content),

            // Live delivery
            AppAction::Reconnect => self.reconnect(),

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "result for previous session dropped");
            return false;
        }
        true
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::SubscriptionOpened { token, id } => {
                self.handle_subscription_opened(token, id)
            }
            InternalEvent::SubscriptionFailed { token, error } => {
                self.handle_subscription_failed(token, error)
            }
            InternalEvent::Push { token, signal } => self.handle_push_signal(token, signal),
            InternalEvent::HistoryLoaded {
                token,
                peer,
                result,
            } => self.apply_history(token, peer, result),
            InternalEvent::SendFinished {
                epoch,
                receiver,
                result,
            } => {
                if self.is_current(epoch) {
                    self.handle_send_finished(receiver, result);
                }
            }
            InternalEvent::MarkedRead { epoch, id } => {
                if self.is_current(epoch) {
                    self.apply_marked_read(id);
                }
            }
            InternalEvent::MarkFailed { epoch, id } => {
                if self.is_current(epoch) {
                    self.read_marker.release(&id);
                }
            }
            InternalEvent::ReadMarkingFinished { epoch } => {
                if self.is_current(epoch) {
                    self.refresh_unread();
                }
            }
            InternalEvent::UnreadFetched { epoch, seq, result } => {
                if self.is_current(epoch) {
                    self.apply_unread(seq, result);
                }
            }
            InternalEvent::DirectoryFetched { epoch, result } => {
                if self.is_current(epoch) {
                    self.apply_directory(result);
                }
            }
            InternalEvent::ContactsFetched { epoch, result } => {
                if self.is_current(epoch) {
                    self.apply_contacts(result);
                }
            }
            InternalEvent::ProfileResolved {
                epoch,
                user,
                profile,
            } => {
                if self.is_current(epoch) {
                    self.apply_resolved_profile(user, profile);
                }
            }
        }
    }
}
