//! Completion notifications — fire-and-forget, at-least-once.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::{MessageSink, OutboundMessage};
use crate::conversation::prompts;
use crate::error::ChannelError;

/// Sends the one payment-confirmed message to a chat identity.
///
/// Failures are the caller's to log; nothing is retried synchronously and
/// the state transition that triggered the send is never rolled back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_completed(&self, chat_id: i64) -> Result<(), ChannelError>;
}

/// Notifier over the chat transport's outbound sink.
pub struct CompletionNotifier {
    sink: Arc<dyn MessageSink>,
}

impl CompletionNotifier {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Notifier for CompletionNotifier {
    async fn notify_completed(&self, chat_id: i64) -> Result<(), ChannelError> {
        self.sink
            .send(chat_id, &OutboundMessage::text(prompts::PAYMENT_CONFIRMED))
            .await?;
        tracing::info!(chat_id, "Completion message sent");
        Ok(())
    }
}
