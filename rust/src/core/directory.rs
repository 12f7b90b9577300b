// Conversation picker entries, newest activity first.

use std::time::Instant;

use chrono::{DateTime, Utc};
use murmur_storage_traits::{ConversationSummary, Profile, UserId};

use super::*;

#[derive(Debug, Default)]
pub(super) struct Directory {
    entries: Vec<ConversationSummary>,
}

impl Directory {
    /// Replace the list with an authoritative fetch. A local entry for `keep`
    /// survives when the server does not know that peer yet.
    pub(super) fn replace(&mut self, fetched: Vec<ConversationSummary>, keep: Option<&UserId>) {
        let kept = keep.and_then(|peer| {
            if fetched.iter().any(|s| &s.peer == peer) {
                None
            } else {
                self.entries.iter().find(|s| &s.peer == peer).cloned()
            }
        });
        self.entries = fetched;
        if let Some(entry) = kept {
            self.entries.push(entry);
        }
        self.sort();
    }

    /// Make sure `peer` has an entry, synthesizing one stamped `now`.
    pub(super) fn select(&mut self, peer: &UserId, profile: Option<&Profile>, now: DateTime<Utc>) {
        if self.entries.iter().any(|s| &s.peer == peer) {
            return;
        }
        self.entries.push(ConversationSummary {
            peer: peer.clone(),
            peer_name: profile.and_then(|p| p.username.clone()),
            peer_avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            last_activity_at: now,
        });
        self.sort();
    }

    /// Raise `peer`'s last activity to `at`. Never lowers it.
    pub(super) fn touch(&mut self, peer: &UserId, at: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|s| &s.peer == peer) {
            Some(entry) if entry.last_activity_at >= at => return false,
            Some(entry) => entry.last_activity_at = at,
            None => self.entries.push(ConversationSummary {
                peer: peer.clone(),
                peer_name: None,
                peer_avatar_url: None,
                last_activity_at: at,
            }),
        }
        self.sort();
        true
    }

    pub(super) fn get(&self, peer: &UserId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|s| &s.peer == peer)
    }

    pub(super) fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
    }
}

impl AppCore {
    pub(super) fn refresh_directory(&mut self) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        self.set_busy(|b| b.refreshing_directory = true);
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = backend.fetch_directory(&me).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::DirectoryFetched {
                epoch,
                result,
            })));
        });
    }

    pub(super) fn apply_directory(&mut self, result: Result<Vec<ConversationSummary>, BackendError>) {
        self.state.busy.refreshing_directory = false;
        match result {
            Ok(fetched) => {
                let now = Instant::now();
                for s in &fetched {
                    let profile = Profile {
                        username: s.peer_name.clone(),
                        avatar_url: s.peer_avatar_url.clone(),
                    };
                    self.profiles.seed(&s.peer, profile, now);
                }
                let open = self.state.open_peer().cloned();
                self.directory.replace(fetched, open.as_ref());
                self.state.directory = self.directory.entries().to_vec();
            }
            Err(e) => tracing::warn!(kind = e.kind(), %e, "directory refresh failed"),
        }
        self.emit_state();
    }

    pub(super) fn touch_directory(&mut self, peer: &UserId, at: DateTime<Utc>) {
        if self.directory.touch(peer, at) {
            self.state.directory = self.directory.entries().to_vec();
            self.emit_state();
        }
    }
}
