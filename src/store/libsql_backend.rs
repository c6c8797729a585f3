//! libSQL backend — async `RecordStore` implementation.
//!
//! Local file or in-memory databases; one connection reused for all
//! operations (`libsql::Connection` is safe for concurrent async use).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};

use crate::activity::ExternalAccount;
use crate::conversation::{Session, SessionPatch, SessionState};
use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::RecordStore;

/// Settings key holding the inbound-event Cursor.
const CURSOR_KEY: &str = "inbound_offset";

const SESSION_COLUMNS: &str = "chat_id, state, name, phone, capital_band, account_id, \
     confirmed_balance, payment_confirmed_at, created_at, updated_at";

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("creating database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("opening libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("creating connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Store opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("creating in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("creating connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Parse a stored state string. Anything unrecognized is treated as
/// `START` so the conversation restarts instead of wedging.
fn parse_state(raw: &str) -> SessionState {
    SessionState::parse(raw).unwrap_or_else(|| {
        warn!(state = raw, "Unrecognized session state, resetting to START");
        SessionState::Start
    })
}

fn row_to_session(row: &libsql::Row) -> Result<Session, StoreError> {
    let state_raw: String = row
        .get(1)
        .map_err(|e| StoreError::Query(format!("reading state: {e}")))?;
    let created: String = row
        .get(8)
        .map_err(|e| StoreError::Query(format!("reading created_at: {e}")))?;
    let updated: String = row
        .get(9)
        .map_err(|e| StoreError::Query(format!("reading updated_at: {e}")))?;

    Ok(Session {
        chat_id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("reading chat_id: {e}")))?,
        state: parse_state(&state_raw),
        name: row.get::<String>(2).ok(),
        phone: row.get::<String>(3).ok(),
        capital_band: row.get::<String>(4).ok(),
        account_id: row.get::<String>(5).ok(),
        confirmed_balance: row.get::<f64>(6).ok(),
        payment_confirmed_at: row.get::<String>(7).ok().map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_account(row: &libsql::Row) -> Result<ExternalAccount, StoreError> {
    let attributes_raw: String = row.get(4).unwrap_or_else(|_| "{}".into());
    let updated: String = row
        .get(5)
        .map_err(|e| StoreError::Query(format!("reading updated_at: {e}")))?;

    Ok(ExternalAccount {
        account_id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("reading account_id: {e}")))?,
        balance: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("reading balance: {e}")))?,
        registered_at: row.get::<String>(2).ok().map(|s| parse_datetime(&s)),
        register_time_text: row.get::<String>(3).ok(),
        attributes: serde_json::from_str(&attributes_raw)
            .unwrap_or_else(|_| serde_json::json!({})),
        updated_at: parse_datetime(&updated),
    })
}

// ── RecordStore implementation ──────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn get_session(&self, chat_id: i64) -> Result<Option<Session>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE chat_id = ?1"),
                params![chat_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_session: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_session row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn apply_transition(
        &self,
        chat_id: i64,
        state: SessionState,
        patch: &SessionPatch,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        if patch.reset_profile {
            self.conn()
                .execute(
                    "INSERT INTO sessions (chat_id, state, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(chat_id) DO UPDATE SET
                         state = excluded.state,
                         name = NULL,
                         phone = NULL,
                         capital_band = NULL,
                         updated_at = excluded.updated_at",
                    params![chat_id, state.as_str(), now],
                )
                .await
                .map_err(|e| StoreError::Query(format!("apply_transition reset: {e}")))?;
        } else {
            self.conn()
                .execute(
                    "INSERT INTO sessions
                         (chat_id, state, name, phone, capital_band, account_id,
                          created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(chat_id) DO UPDATE SET
                         state = excluded.state,
                         name = COALESCE(excluded.name, sessions.name),
                         phone = COALESCE(excluded.phone, sessions.phone),
                         capital_band = COALESCE(excluded.capital_band, sessions.capital_band),
                         account_id = COALESCE(sessions.account_id, excluded.account_id),
                         updated_at = excluded.updated_at",
                    params![
                        chat_id,
                        state.as_str(),
                        opt_text_owned(patch.name.clone()),
                        opt_text_owned(patch.phone.clone()),
                        opt_text_owned(patch.capital_band.clone()),
                        opt_text_owned(patch.account_id.clone()),
                        now
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("apply_transition: {e}")))?;
        }

        tracing::debug!(chat_id, state = %state, "Session transition applied");
        Ok(())
    }

    async fn sessions_in_state(&self, state: SessionState) -> Result<Vec<Session>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE state = ?1 ORDER BY chat_id"
                ),
                params![state.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("sessions_in_state: {e}")))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("sessions_in_state row: {e}")))?
        {
            sessions.push(row_to_session(&row)?);
        }
        Ok(sessions)
    }

    async fn complete_session(
        &self,
        chat_id: i64,
        confirmed_balance: f64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE sessions SET
                     state = ?2,
                     confirmed_balance = ?3,
                     payment_confirmed_at = ?4,
                     updated_at = ?5
                 WHERE chat_id = ?1",
                params![
                    chat_id,
                    SessionState::Completed.as_str(),
                    confirmed_balance,
                    confirmed_at.to_rfc3339(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("complete_session: {e}")))?;
        Ok(())
    }

    async fn account_exists(&self, account_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM accounts WHERE account_id = ?1 LIMIT 1",
                params![account_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("account_exists: {e}")))?;

        Ok(rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("account_exists row: {e}")))?
            .is_some())
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<ExternalAccount>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT account_id, balance, registered_at, register_time_text,
                        attributes, updated_at
                 FROM accounts WHERE account_id = ?1",
                params![account_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_account: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_account row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_accounts(&self, accounts: &[ExternalAccount]) -> Result<(), StoreError> {
        for account in accounts {
            let attributes = serde_json::to_string(&account.attributes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            self.conn()
                .execute(
                    "INSERT INTO accounts
                         (account_id, balance, registered_at, register_time_text,
                          attributes, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(account_id) DO UPDATE SET
                         balance = excluded.balance,
                         registered_at = excluded.registered_at,
                         register_time_text = excluded.register_time_text,
                         attributes = excluded.attributes,
                         updated_at = excluded.updated_at",
                    params![
                        account.account_id.clone(),
                        account.balance,
                        opt_text_owned(account.registered_at.map(|t| t.to_rfc3339())),
                        opt_text_owned(account.register_time_text.clone()),
                        attributes,
                        Utc::now().to_rfc3339()
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("upsert_accounts: {e}")))?;
        }

        tracing::debug!(count = accounts.len(), "Accounts upserted");
        Ok(())
    }

    async fn load_cursor(&self) -> Result<i64, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM settings WHERE key = ?1",
                params![CURSOR_KEY],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_cursor: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("load_cursor row: {e}")))?
        {
            Some(row) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("load_cursor value: {e}")))?;
                Ok(raw.parse().unwrap_or(0))
            }
            None => Ok(0),
        }
    }

    async fn advance_cursor(&self, offset: i64) -> Result<(), StoreError> {
        // Conditional upsert keeps the Cursor monotonically non-decreasing.
        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at
                 WHERE CAST(excluded.value AS INTEGER) >= CAST(settings.value AS INTEGER)",
                params![CURSOR_KEY, offset.to_string(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("advance_cursor: {e}")))?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn account(id: &str, balance: f64) -> ExternalAccount {
        ExternalAccount {
            account_id: id.to_string(),
            balance,
            registered_at: None,
            register_time_text: None,
            attributes: serde_json::json!({ "uid": id, "balanceVolume": balance }),
            updated_at: Utc::now(),
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    #[tokio::test]
    async fn session_created_on_first_transition() {
        let s = store().await;
        assert!(s.get_session(42).await.unwrap().is_none());

        s.apply_transition(42, SessionState::Name, &SessionPatch::reset())
            .await
            .unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.chat_id, 42);
        assert_eq!(session.state, SessionState::Name);
        assert!(session.name.is_none());
    }

    #[tokio::test]
    async fn transition_patch_accumulates_fields() {
        let s = store().await;
        s.apply_transition(42, SessionState::Name, &SessionPatch::reset())
            .await
            .unwrap();
        s.apply_transition(42, SessionState::Phone, &SessionPatch::name("Ali"))
            .await
            .unwrap();
        s.apply_transition(42, SessionState::Capital, &SessionPatch::phone("+989121234567"))
            .await
            .unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Capital);
        assert_eq!(session.name.as_deref(), Some("Ali"));
        assert_eq!(session.phone.as_deref(), Some("+989121234567"));
    }

    #[tokio::test]
    async fn reset_clears_profile_fields() {
        let s = store().await;
        s.apply_transition(42, SessionState::Phone, &SessionPatch::name("Ali"))
            .await
            .unwrap();
        s.apply_transition(42, SessionState::Name, &SessionPatch::reset())
            .await
            .unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Name);
        assert!(session.name.is_none());
    }

    #[tokio::test]
    async fn account_id_is_immutable_once_set() {
        let s = store().await;
        s.apply_transition(
            42,
            SessionState::WaitingPayment,
            &SessionPatch::account_id("AB12345"),
        )
        .await
        .unwrap();
        s.apply_transition(
            42,
            SessionState::WaitingPayment,
            &SessionPatch::account_id("OTHER99"),
        )
        .await
        .unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.account_id.as_deref(), Some("AB12345"));
    }

    #[tokio::test]
    async fn sessions_in_state_filters() {
        let s = store().await;
        s.apply_transition(1, SessionState::WaitingPayment, &SessionPatch::default())
            .await
            .unwrap();
        s.apply_transition(2, SessionState::Name, &SessionPatch::default())
            .await
            .unwrap();
        s.apply_transition(3, SessionState::WaitingPayment, &SessionPatch::default())
            .await
            .unwrap();

        let waiting = s
            .sessions_in_state(SessionState::WaitingPayment)
            .await
            .unwrap();
        let ids: Vec<i64> = waiting.iter().map(|w| w.chat_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn complete_session_stamps_balance_and_time() {
        let s = store().await;
        s.apply_transition(
            42,
            SessionState::WaitingPayment,
            &SessionPatch::account_id("AB12345"),
        )
        .await
        .unwrap();

        let confirmed_at = Utc::now();
        s.complete_session(42, 25.0, confirmed_at).await.unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.confirmed_balance, Some(25.0));
        assert!(session.payment_confirmed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_stored_state_reads_as_start() {
        let s = store().await;
        s.apply_transition(42, SessionState::Name, &SessionPatch::default())
            .await
            .unwrap();
        s.conn()
            .execute(
                "UPDATE sessions SET state = 'REGISTERED' WHERE chat_id = 42",
                (),
            )
            .await
            .unwrap();

        let session = s.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Start);
    }

    // ── Accounts ────────────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_is_idempotent_and_second_write_wins() {
        let s = store().await;
        s.upsert_accounts(&[account("AB12345", 5.0)]).await.unwrap();
        s.upsert_accounts(&[account("AB12345", 25.0)]).await.unwrap();

        let mut rows = s
            .conn()
            .query("SELECT COUNT(*) FROM accounts", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);

        let stored = s.get_account("AB12345").await.unwrap().unwrap();
        assert_eq!(stored.balance, 25.0);
    }

    #[tokio::test]
    async fn account_exists_reflects_upserts() {
        let s = store().await;
        assert!(!s.account_exists("AB12345").await.unwrap());
        s.upsert_accounts(&[account("AB12345", 1.0)]).await.unwrap();
        assert!(s.account_exists("AB12345").await.unwrap());
    }

    #[tokio::test]
    async fn account_attributes_round_trip() {
        let s = store().await;
        let mut acc = account("AB12345", 7.5);
        acc.attributes = serde_json::json!({ "uid": "AB12345", "inviteCode": "Wr5Pbu" });
        s.upsert_accounts(&[acc]).await.unwrap();

        let stored = s.get_account("AB12345").await.unwrap().unwrap();
        assert_eq!(stored.attributes["inviteCode"], "Wr5Pbu");
    }

    // ── Cursor ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn cursor_defaults_to_zero() {
        let s = store().await;
        assert_eq!(s.load_cursor().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cursor_survives_restart_and_stays_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vip-onboard.db");

        {
            let s = LibSqlBackend::new_local(&path).await.unwrap();
            s.advance_cursor(123).await.unwrap();
        }

        let s = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(s.load_cursor().await.unwrap(), 123);

        s.advance_cursor(100).await.unwrap();
        assert_eq!(s.load_cursor().await.unwrap(), 123);
    }

    #[tokio::test]
    async fn cursor_persists_and_never_decreases() {
        let s = store().await;
        s.advance_cursor(100).await.unwrap();
        assert_eq!(s.load_cursor().await.unwrap(), 100);

        s.advance_cursor(50).await.unwrap();
        assert_eq!(s.load_cursor().await.unwrap(), 100, "cursor must not move backwards");

        s.advance_cursor(101).await.unwrap();
        assert_eq!(s.load_cursor().await.unwrap(), 101);
    }
}
