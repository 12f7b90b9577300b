// Global unread count. Only ever replaced by an authoritative fetch.

use super::*;

#[derive(Debug, Default)]
pub(super) struct UnreadTracker {
    count: u64,
    issued: u64,
    applied: u64,
}

impl UnreadTracker {
    /// Sequence number for a new refresh request.
    pub(super) fn begin_refresh(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Apply a refresh response. Responses older than the newest applied one
    /// are dropped. Returns whether the count changed.
    pub(super) fn apply(&mut self, seq: u64, count: u64) -> bool {
        if seq <= self.applied {
            return false;
        }
        self.applied = seq;
        let changed = self.count != count;
        self.count = count;
        changed
    }

    pub(super) fn count(&self) -> u64 {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = 0;
        // Keep `issued` monotonic so responses for the previous identity can
        // never be mistaken for fresh ones.
        self.applied = self.issued;
    }
}

impl AppCore {
    pub(super) fn refresh_unread(&mut self) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        let seq = self.unread.begin_refresh();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = backend.unread_count(&me).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::UnreadFetched {
                epoch,
                seq,
                result,
            })));
        });
    }

    pub(super) fn apply_unread(&mut self, seq: u64, result: Result<u64, BackendError>) {
        match result {
            Ok(count) => {
                if self.unread.apply(seq, count) {
                    tracing::debug!(count, "unread count");
                    self.state.unread_count = self.unread.count();
                    self.emit_state();
                }
            }
            Err(e) => tracing::warn!(kind = e.kind(), %e, "unread refresh failed"),
        }
    }
}
