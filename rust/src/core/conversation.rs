// Opening a conversation: hydrate from history, then read-mark.

use std::time::Instant;

use murmur_storage_traits::Message;

use super::*;

impl AppCore {
    pub(super) fn open_conversation(&mut self, peer: UserId) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            self.toast("Sign in to open a conversation");
            return;
        };
        if peer == me {
            self.toast("You cannot message yourself");
            return;
        }
        if self.state.open_peer() == Some(&peer) {
            return;
        }
        tracing::info!(peer = %peer, "open_conversation");

        let profile = self.peer_profile(&peer);
        self.directory.select(&peer, profile.as_ref(), chrono::Utc::now());
        self.state.directory = self.directory.entries().to_vec();

        self.store.clear();
        self.state.current_conversation = Some(ConversationViewState {
            peer: peer.clone(),
            peer_name: profile.as_ref().and_then(|p| p.username.clone()),
            peer_avatar_url: profile.and_then(|p| p.avatar_url),
            messages: vec![],
        });
        self.state.busy.loading_history = true;
        self.emit_state();

        // Any history still in flight belongs to the previous conversation.
        self.hydrate_token = self.hydrate_token.wrapping_add(1);
        let token = self.hydrate_token;
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.fetch_conversation(&me, &peer).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryLoaded {
                token,
                peer,
                result,
            })));
        });
    }

    pub(super) fn close_conversation(&mut self) {
        if self.state.current_conversation.is_none() {
            return;
        }
        self.hydrate_token = self.hydrate_token.wrapping_add(1);
        self.store.clear();
        self.state.current_conversation = None;
        self.state.busy.loading_history = false;
        self.emit_state();
    }

    pub(super) fn apply_history(
        &mut self,
        token: u64,
        peer: UserId,
        result: Result<Vec<Message>, BackendError>,
    ) {
        if token != self.hydrate_token || self.state.open_peer() != Some(&peer) {
            tracing::debug!(peer = %peer, "late history discarded");
            return;
        }
        self.state.busy.loading_history = false;
        let history = match result {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(peer = %peer, kind = e.kind(), %e, "history load failed");
                self.toast(format!("Failed to load messages: {e}"));
                return;
            }
        };
        // Live events that landed while the fetch was in flight stay, and a
        // read flag they picked up survives an older snapshot.
        let live = self.store.take();
        let fetched = history.len();
        self.store.hydrate(history);
        for m in live {
            self.store.merge(m);
        }
        tracing::debug!(peer = %peer, fetched, total = self.store.len(), "history loaded");

        self.seed_profiles_from_store();
        let now = Instant::now();
        for sender in self.store.senders() {
            if let Some(profile) = self.profiles.get(&sender, now).cloned() {
                self.store.apply_sender_profile(&sender, &profile);
            }
        }
        self.sync_current_conversation();
        self.mark_loaded_messages_read();
    }

    /// Copy the store into the view state. Does not emit.
    pub(super) fn project_conversation(&mut self) {
        if let Some(view) = self.state.current_conversation.as_mut() {
            view.messages = self.store.messages().to_vec();
        }
    }

    pub(super) fn sync_current_conversation(&mut self) {
        self.project_conversation();
        self.emit_state();
    }

    fn peer_profile(&self, peer: &UserId) -> Option<Profile> {
        if let Some(c) = self.state.contacts.iter().find(|c| &c.user == peer) {
            return Some(c.profile());
        }
        if let Some(s) = self.directory.get(peer) {
            return Some(Profile {
                username: s.peer_name.clone(),
                avatar_url: s.peer_avatar_url.clone(),
            });
        }
        self.profiles.get(peer, Instant::now()).cloned()
    }
}
