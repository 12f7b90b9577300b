// Marks inbound messages read on the server. An id is submitted once per
// session unless its mark fails, in which case a later hydration retries it.

use std::collections::HashSet;

use murmur_storage_traits::MessageId;

use super::*;

#[derive(Debug, Default)]
pub(super) struct ReadMarker {
    submitted: HashSet<MessageId>,
}

impl ReadMarker {
    /// Keep only ids not already submitted or marked, and record them.
    pub(super) fn claim(&mut self, ids: Vec<MessageId>) -> Vec<MessageId> {
        ids.into_iter()
            .filter(|id| self.submitted.insert(id.clone()))
            .collect()
    }

    /// Forget a failed submission so the next hydration picks it up again.
    pub(super) fn release(&mut self, id: &MessageId) {
        self.submitted.remove(id);
    }

    pub(super) fn clear(&mut self) {
        self.submitted.clear();
    }
}

impl AppCore {
    /// Mark every unread inbound message of the open conversation.
    pub(super) fn mark_loaded_messages_read(&mut self) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        let unread = self.store.unread_inbound(&me);
        self.mark_messages_read(unread);
    }

    /// Submit `ids` one by one, tolerating individual failures, then refresh
    /// the unread count once.
    pub(super) fn mark_messages_read(&mut self, ids: Vec<MessageId>) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            return;
        };
        let ids = self.read_marker.claim(ids);
        if ids.is_empty() {
            self.refresh_unread();
            return;
        }
        tracing::debug!(count = ids.len(), "mark_read batch");

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            for id in ids {
                match backend.mark_read(&id, &me).await {
                    Ok(()) => {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MarkedRead {
                            epoch,
                            id,
                        })));
                    }
                    Err(BackendError::NotFound(_)) => {
                        tracing::debug!(id = %id, "mark_read: message gone, skipped");
                    }
                    Err(e) => {
                        tracing::warn!(id = %id, kind = e.kind(), %e, "mark_read failed, skipped");
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MarkFailed {
                            epoch,
                            id,
                        })));
                    }
                }
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ReadMarkingFinished { epoch },
            )));
        });
    }

    pub(super) fn apply_marked_read(&mut self, id: MessageId) {
        if self.store.mark_read(&id) {
            self.sync_current_conversation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_claimed_once() {
        let mut marker = ReadMarker::default();
        let a = MessageId::from("a");
        let b = MessageId::from("b");
        assert_eq!(marker.claim(vec![a.clone(), b.clone()]), vec![a.clone(), b.clone()]);
        assert_eq!(marker.claim(vec![a.clone()]), Vec::<MessageId>::new());
        marker.clear();
        assert_eq!(marker.claim(vec![a.clone()]), vec![a]);
    }

    #[test]
    fn released_ids_can_be_claimed_again() {
        let mut marker = ReadMarker::default();
        let a = MessageId::from("a");
        let b = MessageId::from("b");
        assert_eq!(marker.claim(vec![a.clone(), b.clone()]), vec![a.clone(), b.clone()]);
        // Still in flight.
        assert!(marker.claim(vec![a.clone(), b.clone()]).is_empty());
        marker.release(&a);
        assert_eq!(marker.claim(vec![a.clone(), b.clone()]), vec![a]);
    }
}
