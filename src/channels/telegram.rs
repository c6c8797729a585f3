//! Telegram channel — explicit `getUpdates` pull plus outbound sends.
//!
//! Native Bot API implementation behind the `UpdateSource` and
//! `MessageSink` traits. Unlike a long-running listener task, the update
//! fetch is a single pull per call: the inbound loop owns the cadence and
//! the persisted offset.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{
    EventPayload, InboundEvent, Keyboard, MessageSink, OutboundMessage, UpdateSource,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram channel — talks to the Bot API over HTTPS.
pub struct TelegramChannel {
    bot_token: SecretString,
    /// Long-poll timeout (seconds) passed to getUpdates.
    poll_timeout_secs: u32,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, poll_timeout_secs: u32) -> Self {
        Self {
            bot_token,
            poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Verify the token against getMe. Called once at startup.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::HealthCheckFailed(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::HealthCheckFailed(format!(
                "getMe returned {}",
                resp.status()
            )))
        }
    }

    /// Send a text message, splitting chunks that exceed Telegram's limit.
    /// The keyboard hint rides on the final chunk.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(markup) = reply_markup(keyboard) {
                    body["reply_markup"] = markup;
                }
            }

            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    chat_id,
                    reason: e.to_string(),
                })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let err = resp.text().await.unwrap_or_default();
                return Err(ChannelError::SendFailed {
                    chat_id,
                    reason: format!("sendMessage returned {status}: {err}"),
                });
            }
        }
        Ok(())
    }

    /// Send a photo from a local file via multipart upload.
    async fn send_photo(&self, chat_id: i64, file_path: &Path) -> Result<(), ChannelError> {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.jpg");

        let file_bytes =
            tokio::fs::read(file_path)
                .await
                .map_err(|e| ChannelError::SendFailed {
                    chat_id,
                    reason: format!("failed to read {}: {e}", file_path.display()),
                })?;
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                chat_id,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                chat_id,
                reason: format!("sendPhoto failed: {err}"),
            });
        }

        tracing::info!(chat_id, file = %file_path.display(), "Telegram photo sent");
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramChannel {
    async fn fetch_updates(
        &self,
        offset: i64,
        limit: u32,
    ) -> Result<Vec<InboundEvent>, ChannelError> {
        let body = serde_json::json!({
            "offset": offset,
            "limit": limit,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed(e.to_string()))?;

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::FetchFailed(format!("decode: {e}")))?;

        let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
            return Err(ChannelError::FetchFailed(format!(
                "getUpdates returned no result array: {}",
                data.get("description")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error")
            )));
        };

        Ok(results.iter().filter_map(parse_update).collect())
    }
}

#[async_trait]
impl MessageSink for TelegramChannel {
    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), ChannelError> {
        if let Some(ref photo) = message.photo {
            self.send_photo(chat_id, photo).await?;
        }
        self.send_text(chat_id, &message.text, &message.keyboard)
            .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Map one raw getUpdates entry to an InboundEvent.
///
/// Every update with an id yields an event so the Cursor can advance past
/// it; payloads the bot cannot use become `Unsupported`.
fn parse_update(update: &serde_json::Value) -> Option<InboundEvent> {
    let update_id = update.get("update_id").and_then(serde_json::Value::as_i64)?;

    let message = update.get("message");
    let chat_id = message
        .and_then(|m| m.get("chat"))
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);

    let payload = match message {
        Some(m) => {
            if let Some(phone) = m
                .get("contact")
                .and_then(|c| c.get("phone_number"))
                .and_then(serde_json::Value::as_str)
            {
                EventPayload::Contact {
                    phone_number: phone.to_string(),
                }
            } else if let Some(text) = m.get("text").and_then(serde_json::Value::as_str) {
                EventPayload::Text(text.to_string())
            } else {
                EventPayload::Unsupported
            }
        }
        None => EventPayload::Unsupported,
    };

    Some(InboundEvent {
        update_id,
        chat_id,
        payload,
    })
}

/// Build the reply_markup JSON for a keyboard hint, if any.
fn reply_markup(keyboard: &Keyboard) -> Option<serde_json::Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Remove => Some(serde_json::json!({ "remove_keyboard": true })),
        Keyboard::RequestContact(label) => Some(serde_json::json!({
            "keyboard": [[{ "text": label, "request_contact": true }]],
            "one_time_keyboard": true,
            "resize_keyboard": true,
        })),
        Keyboard::Choices(rows) => {
            let keyboard: Vec<Vec<serde_json::Value>> = rows
                .iter()
                .map(|label| vec![serde_json::json!({ "text": label })])
                .collect();
            Some(serde_json::json!({
                "keyboard": keyboard,
                "one_time_keyboard": true,
                "resize_keyboard": true,
            }))
        }
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let chunk = &remaining[..max_len];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(max_len);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { max_len } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
