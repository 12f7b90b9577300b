// Session lifecycle + push subscription side effects.

use murmur_storage_traits::{PushTransport, SubscriptionId};

use super::*;

pub(super) struct Session {
    pub(super) user: UserId,
    /// Token of the current subscription attempt; signals carrying any other
    /// token are dropped.
    pub(super) sub_token: u64,
    subscription: Option<SubscriptionId>,
    alive: Arc<AtomicBool>,
}

impl Session {
    fn new(user: UserId) -> Self {
        Self {
            user,
            sub_token: 0,
            subscription: None,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop forwarding and release the transport subscription.
    pub(super) fn stop_subscription(
        &mut self,
        runtime: &tokio::runtime::Runtime,
        push: Arc<dyn PushTransport>,
    ) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(id) = self.subscription.take() {
            tracing::debug!(%id, user = %self.user, "unsubscribe");
            runtime.spawn(async move {
                push.unsubscribe(id).await;
            });
        }
    }
}

impl AppCore {
    pub(super) fn start_session(&mut self, user: UserId) {
        // Tear down any existing session first.
        self.stop_session();

        tracing::info!(user = %user, "start_session");
        self.epoch = self.epoch.wrapping_add(1);
        self.session = Some(Session::new(user.clone()));
        self.state.auth = AuthState::LoggedIn { user };
        self.emit_state();

        self.open_subscription();
        self.refresh_directory();
        self.refresh_unread();
        self.load_contacts();
    }

    pub(super) fn stop_session(&mut self) {
        let Some(mut sess) = self.session.take() else {
            return;
        };
        tracing::info!(user = %sess.user, "stop_session");
        sess.stop_subscription(&self.runtime, self.push.clone());
        // Results of work started for this session are now stale.
        self.epoch = self.epoch.wrapping_add(1);
        self.hydrate_token = self.hydrate_token.wrapping_add(1);

        self.store.clear();
        self.directory.clear();
        self.profiles.clear();
        self.read_marker.clear();
        self.unread.reset();

        self.state.auth = AuthState::LoggedOut;
        self.state.subscription = SubscriptionState::Unsubscribed;
        self.state.busy = BusyState::idle();
        self.state.directory = vec![];
        self.state.contacts = vec![];
        self.state.current_conversation = None;
        self.state.unread_count = 0;
        self.state.composer = ComposerState::default();
        self.emit_state();
    }

    /// Open a fresh subscription for the signed-in user.
    pub(super) fn open_subscription(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        self.sub_seq = self.sub_seq.wrapping_add(1);
        let token = self.sub_seq;
        sess.sub_token = token;
        sess.subscription = None;
        let alive = Arc::new(AtomicBool::new(true));
        sess.alive = alive.clone();
        let user = sess.user.clone();

        self.set_subscription(SubscriptionState::Subscribing);

        let push = self.push.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let mut sub = match push.subscribe(&user).await {
                Ok(sub) => sub,
                Err(error) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::SubscriptionFailed { token, error },
                    )));
                    return;
                }
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::SubscriptionOpened { token, id: sub.id },
            )));
            // One forwarding task per subscription, so signals reach the actor in
            // delivery order.
            while let Some(signal) = sub.signals.recv().await {
                if !alive.load(Ordering::SeqCst) {
                    break;
                }
                if tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::Push {
                        token,
                        signal,
                    })))
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!(token, "push forwarding finished");
        });
    }

    pub(super) fn handle_subscription_opened(&mut self, token: u64, id: SubscriptionId) {
        match self.session.as_mut() {
            Some(sess) if sess.sub_token == token && sess.alive.load(Ordering::SeqCst) => {
                tracing::info!(%id, user = %sess.user, "subscription opened");
                sess.subscription = Some(id);
            }
            _ => {
                // Session or attempt ended while the handshake was in flight.
                tracing::debug!(%id, token, "stale subscription released");
                let push = self.push.clone();
                self.runtime.spawn(async move {
                    push.unsubscribe(id).await;
                });
            }
        }
    }

    pub(super) fn handle_subscription_failed(&mut self, token: u64, error: PushError) {
        if self.session.as_ref().map(|s| s.sub_token) != Some(token) {
            return;
        }
        tracing::warn!(%error, "subscription failed");
        self.set_subscription(SubscriptionState::Error {
            reason: error.to_string(),
        });
    }

    pub(super) fn reconnect(&mut self) {
        if self.session.is_none() {
            tracing::debug!("reconnect ignored: signed out");
            return;
        }
        if !self.state.subscription.is_terminal() {
            tracing::debug!(state = ?self.state.subscription, "reconnect ignored: channel not failed");
            return;
        }
        self.open_subscription();
        // Events missed while offline only show up through the authoritative
        // views.
        self.refresh_unread();
        self.refresh_directory();
    }

    pub(super) fn set_subscription(&mut self, next: SubscriptionState) {
        if self.state.subscription == next {
            return;
        }
        if !self.state.subscription.can_transition_to(&next) {
            tracing::debug!(from = ?self.state.subscription, to = ?next, "subscription transition ignored");
            return;
        }
        tracing::info!(state = ?next, "subscription state");
        self.state.subscription = next;
        self.emit_state();
    }

    pub(super) fn load_contacts(&mut self) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = backend.list_users().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ContactsFetched {
                epoch,
                result,
            })));
        });
    }

    pub(super) fn apply_contacts(&mut self, result: Result<Vec<Contact>, BackendError>) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        match result {
            Ok(users) => {
                self.state.contacts = users.into_iter().filter(|c| c.user != me).collect();
                self.emit_state();
            }
            Err(e) => tracing::warn!(kind = e.kind(), %e, "contacts load failed"),
        }
    }
}
