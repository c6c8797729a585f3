//! Conversational onboarding engine — a finite-state machine over
//! persisted sessions.
//!
//! Commands are dispatched before state routing and apply uniformly in
//! every state. Validation failures never transition; the reply carries
//! the reason verbatim plus the cancel affordance. Transitions out of
//! `WAITING_PAYMENT` are owned by the reconciliation sweep, never by
//! inbound events.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::channels::{EventPayload, InboundEvent, Keyboard, OutboundMessage};
use crate::conversation::model::{SessionPatch, SessionState};
use crate::conversation::{prompts, validate};
use crate::error::Result;
use crate::store::RecordStore;

/// Drives onboarding sessions in response to inbound events.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    uid_image_path: PathBuf,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, uid_image_path: PathBuf) -> Self {
        Self {
            store,
            uid_image_path,
        }
    }

    /// Process one inbound event and return the replies to deliver.
    pub async fn handle_event(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        let chat_id = event.chat_id;
        let session = self.store.get_session(chat_id).await?;
        let state = session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Start);

        info!(chat_id, state = %state, "Inbound event");

        // Commands win over state routing.
        if let EventPayload::Text(text) = &event.payload {
            let trimmed = text.trim();
            if trimmed.starts_with('/') {
                return self.handle_command(chat_id, state, trimmed).await;
            }
        }

        match state {
            SessionState::Start => Ok(vec![OutboundMessage::text(prompts::START_HINT)]),
            SessionState::Name => self.handle_name(event).await,
            SessionState::Phone => self.handle_phone(event).await,
            SessionState::Capital => self.handle_capital(event).await,
            SessionState::AccountId => self.handle_account_id(event).await,
            SessionState::WaitingPayment => {
                Ok(vec![OutboundMessage::text(prompts::WAITING_PAYMENT)])
            }
            SessionState::Completed => Ok(vec![OutboundMessage::text(prompts::COMPLETED_INFO)]),
            SessionState::Cancelled => Ok(vec![OutboundMessage::text(prompts::CANCELLED_INFO)]),
        }
    }

    async fn handle_command(
        &self,
        chat_id: i64,
        state: SessionState,
        command: &str,
    ) -> Result<Vec<OutboundMessage>> {
        match command {
            "/start" => {
                self.store
                    .apply_transition(chat_id, SessionState::Name, &SessionPatch::reset())
                    .await?;
                Ok(vec![
                    OutboundMessage::text(prompts::WELCOME).with_keyboard(Keyboard::Remove),
                ])
            }
            "/cancel" => {
                if state.is_terminal() {
                    let text = match state {
                        SessionState::Completed => prompts::COMPLETED_INFO,
                        _ => prompts::CANCELLED_INFO,
                    };
                    return Ok(vec![OutboundMessage::text(text)]);
                }
                self.store
                    .apply_transition(chat_id, SessionState::Cancelled, &SessionPatch::default())
                    .await?;
                Ok(vec![
                    OutboundMessage::text(prompts::CANCELLED).with_keyboard(Keyboard::Remove),
                ])
            }
            "/help" => Ok(vec![OutboundMessage::text(prompts::HELP)]),
            _ => Ok(vec![OutboundMessage::text(prompts::UNKNOWN_COMMAND)]),
        }
    }

    async fn handle_name(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        match validate::validate_name(event_text(event)) {
            Ok(name) => {
                self.store
                    .apply_transition(
                        event.chat_id,
                        SessionState::Phone,
                        &SessionPatch::name(name.clone()),
                    )
                    .await?;
                Ok(vec![
                    OutboundMessage::text(prompts::name_accepted(&name)).with_keyboard(
                        Keyboard::RequestContact(prompts::PHONE_PROMPT_BUTTON.to_string()),
                    ),
                ])
            }
            Err(e) => Ok(vec![OutboundMessage::text(prompts::validation_reply(
                &e.0,
                prompts::RETRY_HINT,
            ))]),
        }
    }

    async fn handle_phone(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        // A shared contact beats free text.
        let input = match &event.payload {
            EventPayload::Contact { phone_number } => phone_number.as_str(),
            _ => event_text(event),
        };

        match validate::validate_phone(input) {
            Ok(phone) => {
                self.store
                    .apply_transition(
                        event.chat_id,
                        SessionState::Capital,
                        &SessionPatch::phone(phone),
                    )
                    .await?;
                Ok(vec![
                    OutboundMessage::text(prompts::CAPITAL_PROMPT)
                        .with_keyboard(prompts::capital_keyboard()),
                ])
            }
            Err(e) => Ok(vec![OutboundMessage::text(prompts::validation_reply(
                &e.0,
                prompts::PHONE_RETRY_HINT,
            ))]),
        }
    }

    async fn handle_capital(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        let input = event_text(event).trim();

        if prompts::CAPITAL_BANDS.contains(&input) {
            self.store
                .apply_transition(
                    event.chat_id,
                    SessionState::AccountId,
                    &SessionPatch::capital_band(input),
                )
                .await?;
            Ok(vec![
                OutboundMessage::text(prompts::ACCOUNT_ID_PROMPT)
                    .with_photo(self.uid_image_path.clone())
                    .with_keyboard(Keyboard::Remove),
            ])
        } else {
            Ok(vec![
                OutboundMessage::text(prompts::CAPITAL_RETRY)
                    .with_keyboard(prompts::capital_keyboard()),
            ])
        }
    }

    async fn handle_account_id(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        let normalized = validate::normalize_digits(event_text(event).trim());

        match validate::validate_account_id(&normalized) {
            Ok(account_id) => {
                self.store
                    .apply_transition(
                        event.chat_id,
                        SessionState::WaitingPayment,
                        &SessionPatch::account_id(account_id),
                    )
                    .await?;

                // Re-read so the summary shows what is actually stored
                // (the account id is first-write-wins).
                let session = self.store.get_session(event.chat_id).await?;
                let (name, phone, account_id) = match session {
                    Some(s) => (
                        s.name.unwrap_or_default(),
                        s.phone.unwrap_or_default(),
                        s.account_id.unwrap_or_default(),
                    ),
                    None => Default::default(),
                };

                info!(chat_id = event.chat_id, "Registration data complete, waiting for payment");
                Ok(vec![OutboundMessage::text(prompts::registration_summary(
                    &name,
                    &phone,
                    &account_id,
                ))])
            }
            Err(e) => Ok(vec![OutboundMessage::text(prompts::validation_reply(
                &e.0,
                prompts::ACCOUNT_ID_RETRY_HINT,
            ))]),
        }
    }
}

/// Free-text view of an event payload; non-text payloads read as empty.
fn event_text(event: &InboundEvent) -> &str {
    match &event.payload {
        EventPayload::Text(text) => text.as_str(),
        _ => "",
    }
}

// ── Tests ───────────────────────────────────────────────────────────
