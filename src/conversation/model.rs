//! Onboarding session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversational onboarding state, persisted per chat identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Start,
    Name,
    Phone,
    Capital,
    AccountId,
    WaitingPayment,
    Completed,
    Cancelled,
}

impl SessionState {
    /// Stable string form used in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Start => "START",
            SessionState::Name => "NAME",
            SessionState::Phone => "PHONE",
            SessionState::Capital => "CAPITAL",
            SessionState::AccountId => "ACCOUNT_ID",
            SessionState::WaitingPayment => "WAITING_PAYMENT",
            SessionState::Completed => "COMPLETED",
            SessionState::Cancelled => "CANCELLED",
        }
    }

    /// Parse the stored string form. `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "START" => Some(SessionState::Start),
            "NAME" => Some(SessionState::Name),
            "PHONE" => Some(SessionState::Phone),
            "CAPITAL" => Some(SessionState::Capital),
            "ACCOUNT_ID" => Some(SessionState::AccountId),
            "WAITING_PAYMENT" => Some(SessionState::WaitingPayment),
            "COMPLETED" => Some(SessionState::Completed),
            "CANCELLED" => Some(SessionState::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept events but never transition again
    /// through the conversation engine.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per chat identity; created on first contact, never deleted.
#[derive(Debug, Clone)]
pub struct Session {
    pub chat_id: i64,
    pub state: SessionState,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub capital_band: Option<String>,
    /// External account identifier; immutable once set.
    pub account_id: Option<String>,
    /// Balance observed when payment was confirmed.
    pub confirmed_balance: Option<f64>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field changes applied together with a state transition.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub capital_band: Option<String>,
    /// First write wins; the store ignores this for sessions that
    /// already carry an account id.
    pub account_id: Option<String>,
    /// Clear all collected fields (used by the begin command).
    pub reset_profile: bool,
}

impl SessionPatch {
    pub fn reset() -> Self {
        Self {
            reset_profile: true,
            ..Self::default()
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self {
            name: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn phone(value: impl Into<String>) -> Self {
        Self {
            phone: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn capital_band(value: impl Into<String>) -> Self {
        Self {
            capital_band: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn account_id(value: impl Into<String>) -> Self {
        Self {
            account_id: Some(value.into()),
            ..Self::default()
        }
    }
}
