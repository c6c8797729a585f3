//! `RecordStore` trait — single async interface for all persistence.
//!
//! Three record families: onboarding sessions keyed by chat id, external
//! accounts keyed by provider account id, and the single inbound-event
//! Cursor. Both long-running loops share one store with no cross-loop
//! locking; every method is an atomic single-document operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::activity::ExternalAccount;
use crate::conversation::{Session, SessionPatch, SessionState};
use crate::error::StoreError;

/// Backend-agnostic persistence for sessions, accounts, and the Cursor.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Sessions ────────────────────────────────────────────────────

    /// Look up a session by chat id.
    async fn get_session(&self, chat_id: i64) -> Result<Option<Session>, StoreError>;

    /// Move a session to `state`, applying `patch`, creating the session
    /// if it does not exist. The account id, once set, is never replaced.
    async fn apply_transition(
        &self,
        chat_id: i64,
        state: SessionState,
        patch: &SessionPatch,
    ) -> Result<(), StoreError>;

    /// All sessions currently in `state`.
    async fn sessions_in_state(&self, state: SessionState) -> Result<Vec<Session>, StoreError>;

    /// Promote a session to `COMPLETED`, stamping the confirmed balance
    /// and confirmation time.
    async fn complete_session(
        &self,
        chat_id: i64,
        confirmed_balance: f64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ── External accounts ───────────────────────────────────────────

    /// Whether an account id is already known.
    async fn account_exists(&self, account_id: &str) -> Result<bool, StoreError>;

    /// Look up an account by id.
    async fn get_account(&self, account_id: &str) -> Result<Option<ExternalAccount>, StoreError>;

    /// Idempotent batch upsert keyed by account id; later values win.
    async fn upsert_accounts(&self, accounts: &[ExternalAccount]) -> Result<(), StoreError>;

    // ── Cursor ──────────────────────────────────────────────────────

    /// The last acknowledged inbound-event offset; zero when unset.
    async fn load_cursor(&self) -> Result<i64, StoreError>;

    /// Persist the offset. Monotonic: a smaller value than the stored
    /// one is ignored.
    async fn advance_cursor(&self, offset: i64) -> Result<(), StoreError>;
}
