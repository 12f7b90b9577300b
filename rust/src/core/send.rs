// Composer sends with optimistic local echo.

use murmur_storage_traits::Message;

use super::*;

impl AppCore {
    pub(super) fn set_draft(&mut self, text: String) {
        if self.state.composer.draft == text {
            return;
        }
        self.state.composer.draft = text;
        self.state.composer.error = None;
        self.emit_state();
    }

    pub(super) fn send_message(&mut self, receiver: UserId, content: String) {
        let Some(me) = self.state.signed_in_user().cloned() else {
            self.reject_send("Sign in to send messages");
            return;
        };
        if self.state.composer.sending {
            self.reject_send("Previous message is still sending");
            return;
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            self.reject_send("Message is empty");
            return;
        }
        if receiver == me {
            self.reject_send("You cannot send a message to yourself");
            return;
        }

        self.state.composer.sending = true;
        self.state.composer.error = None;
        self.emit_state();

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = backend.create_message(&me, &receiver, &content).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendFinished {
                epoch,
                receiver,
                result,
            })));
        });
    }

    fn reject_send(&mut self, reason: &str) {
        tracing::debug!(reason, "send rejected locally");
        self.state.composer.error = Some(reason.to_string());
        self.emit_state();
    }

    pub(super) fn handle_send_finished(
        &mut self,
        receiver: UserId,
        result: Result<Message, BackendError>,
    ) {
        self.state.composer.sending = false;
        match result {
            Ok(message) => {
                tracing::info!(id = %message.id, receiver = %receiver, "message sent");
                let at = message.created_at;
                if self.state.open_peer() == Some(&message.receiver) && self.store.insert(message) {
                    self.project_conversation();
                }
                self.directory.touch(&receiver, at);
                self.state.directory = self.directory.entries().to_vec();
                self.state.composer.draft.clear();
                self.state.composer.error = None;
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(receiver = %receiver, kind = e.kind(), %e, "send failed");
                let reason = e.to_string();
                self.state.composer.error = Some(reason.clone());
                self.state.toast = Some(format!("Failed to send message: {reason}"));
                self.emit_state();
            }
        }
    }
}
