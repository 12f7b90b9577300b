// Sender display metadata: session-scoped cache + async lookups.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use murmur_storage_traits::{Profile, UserId};

use super::*;

#[derive(Debug, Clone)]
struct CachedProfile {
    profile: Profile,
    fetched_at: Instant,
}

#[derive(Debug)]
pub(super) struct ProfileCache {
    ttl: Duration,
    entries: HashMap<UserId, CachedProfile>,
    in_flight: HashSet<UserId>,
}

impl ProfileCache {
    pub(super) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Cached profile, if still fresh.
    pub(super) fn get(&self, user: &UserId, now: Instant) -> Option<&Profile> {
        self.entries
            .get(user)
            .filter(|c| now.duration_since(c.fetched_at) < self.ttl)
            .map(|c| &c.profile)
    }

    /// Claim a lookup for `user`. False if one is already running or a fresh
    /// entry exists.
    pub(super) fn begin_lookup(&mut self, user: &UserId, now: Instant) -> bool {
        if self.get(user, now).is_some() || self.in_flight.contains(user) {
            return false;
        }
        self.in_flight.insert(user.clone());
        true
    }

    /// Finish a lookup. Failed lookups are not cached so a later message can
    /// retry.
    pub(super) fn complete(&mut self, user: &UserId, profile: Option<Profile>, now: Instant) {
        self.in_flight.remove(user);
        if let Some(profile) = profile {
            self.insert(user.clone(), profile, now);
        }
    }

    /// Record metadata learned from another source (hydrated rows, directory).
    pub(super) fn seed(&mut self, user: &UserId, profile: Profile, now: Instant) {
        if profile.is_empty() || self.get(user, now).is_some() {
            return;
        }
        self.insert(user.clone(), profile, now);
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
        self.in_flight.clear();
    }

    fn insert(&mut self, user: UserId, profile: Profile, fetched_at: Instant) {
        self.entries.insert(
            user,
            CachedProfile {
                profile,
                fetched_at,
            },
        );
    }
}

impl AppCore {
    /// Ensure metadata for `sender` is on its way. Cached metadata is applied
    /// right away.
    pub(super) fn resolve_sender_profile(&mut self, sender: &UserId) {
        let now = Instant::now();
        if let Some(profile) = self.profiles.get(sender, now).cloned() {
            if self.store.apply_sender_profile(sender, &profile) {
                self.sync_current_conversation();
            }
            return;
        }
        if !self.profiles.begin_lookup(sender, now) {
            return;
        }

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let user = sender.clone();
        self.runtime.spawn(async move {
            let profile = match backend.fetch_profile(&user).await {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::debug!(user = %user, kind = e.kind(), %e, "profile lookup failed");
                    None
                }
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ProfileResolved {
                epoch,
                user,
                profile,
            })));
        });
    }

    pub(super) fn apply_resolved_profile(&mut self, user: UserId, profile: Option<Profile>) {
        let now = Instant::now();
        self.profiles.complete(&user, profile.clone(), now);
        let Some(profile) = profile else {
            return;
        };
        if self.store.apply_sender_profile(&user, &profile) {
            self.sync_current_conversation();
        }
    }

    /// Seed the cache from rows that already carry sender metadata.
    pub(super) fn seed_profiles_from_store(&mut self) {
        let now = Instant::now();
        let known: Vec<(UserId, Profile)> = self
            .store
            .messages()
            .iter()
            .filter_map(|m| m.sender_profile().map(|p| (m.sender.clone(), p)))
            .collect();
        for (user, profile) in known {
            self.profiles.seed(&user, profile, now);
        }
    }
}
