//! Chat transport abstraction — inbound update pull and outbound send.

pub mod telegram;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use telegram::TelegramChannel;

/// One inbound chat event, tagged with the platform's incrementing id.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Platform update identifier; the Cursor advances past it.
    pub update_id: i64,
    /// Originating chat identity.
    pub chat_id: i64,
    /// The user-supplied payload.
    pub payload: EventPayload,
}

/// Payload of an inbound event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Free text (including `/commands`).
    Text(String),
    /// A structured shared-contact payload.
    Contact { phone_number: String },
    /// Anything the transport cannot express as text or contact.
    /// Skipped by the inbound loop; the Cursor still advances past it.
    Unsupported,
}

impl InboundEvent {
    pub fn text(update_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            update_id,
            chat_id,
            payload: EventPayload::Text(text.into()),
        }
    }

    pub fn contact(update_id: i64, chat_id: i64, phone_number: impl Into<String>) -> Self {
        Self {
            update_id,
            chat_id,
            payload: EventPayload::Contact {
                phone_number: phone_number.into(),
            },
        }
    }
}

/// Reply-keyboard hint attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Keyboard {
    /// No markup change.
    #[default]
    None,
    /// Remove any previously shown reply keyboard.
    Remove,
    /// A single button that shares the user's contact.
    RequestContact(String),
    /// One button per row, one-time, resized.
    Choices(Vec<String>),
}

/// One outbound message: text, optional keyboard hint, optional photo.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Keyboard,
    /// Photo sent before the text, as a caption-less attachment.
    pub photo: Option<PathBuf>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
            photo: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn with_photo(mut self, path: impl Into<PathBuf>) -> Self {
        self.photo = Some(path.into());
        self
    }
}

/// Pull-style inbound event source.
///
/// Returns every pending event with an id above `offset`, oldest first.
/// Acknowledgment is the caller's job (the persisted Cursor).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_updates(
        &self,
        offset: i64,
        limit: u32,
    ) -> Result<Vec<InboundEvent>, ChannelError>;
}

/// Fire-and-forget outbound sink.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), ChannelError>;
}
