//! Reconciliation sweep — ingest fetched accounts, promote paid sessions.
//!
//! One sweep is idempotent: it only ever selects sessions still in
//! `WAITING_PAYMENT`, so re-running against already-promoted sessions is a
//! no-op. A failure on one session never aborts the rest.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::activity::ExternalAccount;
use crate::conversation::{Session, SessionState};
use crate::error::Result;
use crate::reconcile::notify::Notifier;
use crate::store::RecordStore;

/// Format of the derived human-readable registration stamp.
const REGISTER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Accounts upserted this sweep.
    pub ingested: usize,
    /// Sessions promoted to COMPLETED.
    pub completed: usize,
    /// Waiting sessions whose account balance is still below threshold.
    pub below_threshold: usize,
    /// Waiting sessions whose account is not yet known.
    pub not_found: usize,
}

/// Applies the balance-threshold rule to waiting sessions.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    threshold: f64,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, threshold: f64) -> Self {
        Self {
            store,
            notifier,
            threshold,
        }
    }

    /// Run one sweep: persist `fetched`, then re-evaluate every waiting
    /// session against the threshold.
    pub async fn run_sweep(&self, mut fetched: Vec<ExternalAccount>) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        for account in &mut fetched {
            account.register_time_text = account
                .registered_at
                .map(|t| t.format(REGISTER_TIME_FORMAT).to_string());
        }
        self.store.upsert_accounts(&fetched).await?;
        stats.ingested = fetched.len();

        let waiting = self
            .store
            .sessions_in_state(SessionState::WaitingPayment)
            .await?;
        debug!(waiting = waiting.len(), "Evaluating waiting sessions");

        for session in &waiting {
            if let Err(e) = self.check_session(session, &mut stats).await {
                warn!(
                    chat_id = session.chat_id,
                    error = %e,
                    "Session check failed, continuing sweep"
                );
            }
        }

        info!(
            ingested = stats.ingested,
            completed = stats.completed,
            below_threshold = stats.below_threshold,
            not_found = stats.not_found,
            "Reconciliation sweep done"
        );
        Ok(stats)
    }

    async fn check_session(&self, session: &Session, stats: &mut SweepStats) -> Result<()> {
        let Some(account_id) = session.account_id.as_deref() else {
            warn!(chat_id = session.chat_id, "Waiting session has no account id, skipping");
            return Ok(());
        };

        let Some(account) = self.store.get_account(account_id).await? else {
            debug!(chat_id = session.chat_id, account_id, "Account not yet known");
            stats.not_found += 1;
            return Ok(());
        };

        if account.balance < self.threshold {
            debug!(
                chat_id = session.chat_id,
                account_id,
                balance = account.balance,
                threshold = self.threshold,
                "Balance below threshold, keeping in WAITING_PAYMENT"
            );
            stats.below_threshold += 1;
            return Ok(());
        }

        self.store
            .complete_session(session.chat_id, account.balance, Utc::now())
            .await?;
        stats.completed += 1;
        info!(
            chat_id = session.chat_id,
            account_id,
            balance = account.balance,
            "Payment confirmed, session completed"
        );

        // At-least-once: the promotion is already persisted, a send
        // failure is only logged.
        if let Err(e) = self.notifier.notify_completed(session.chat_id).await {
            warn!(chat_id = session.chat_id, error = %e, "Completion notification failed");
        }

        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::conversation::SessionPatch;
    use crate::error::ChannelError;
    use crate::store::LibSqlBackend;

    /// Records every notification; optionally fails each send.
    struct MockNotifier {
        notified: Mutex<Vec<i64>>,
        fail: bool,
    }

    impl MockNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                notified: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                notified: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<i64> {
            self.notified.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify_completed(&self, chat_id: i64) -> std::result::Result<(), ChannelError> {
            self.notified.lock().unwrap().push(chat_id);
            if self.fail {
                return Err(ChannelError::SendFailed {
                    chat_id,
                    reason: "mock failure".into(),
                });
            }
            Ok(())
        }
    }

    fn account(id: &str, balance: f64) -> ExternalAccount {
        ExternalAccount {
            account_id: id.to_string(),
            balance,
            registered_at: Some(Utc::now()),
            register_time_text: None,
            attributes: serde_json::json!({ "uid": id, "balanceVolume": balance }),
            updated_at: Utc::now(),
        }
    }

    async fn waiting_session(store: &Arc<dyn RecordStore>, chat_id: i64, account_id: &str) {
        store
            .apply_transition(
                chat_id,
                SessionState::WaitingPayment,
                &SessionPatch::account_id(account_id),
            )
            .await
            .unwrap();
    }

    async fn setup() -> (Arc<dyn RecordStore>, Arc<MockNotifier>, Engine) {
        let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let notifier = MockNotifier::new();
        let engine = Engine::new(Arc::clone(&store), notifier.clone(), 20.0);
        (store, notifier, engine)
    }

    #[tokio::test]
    async fn below_threshold_stays_waiting() {
        let (store, notifier, engine) = setup().await;
        waiting_session(&store, 42, "AB12345").await;

        let stats = engine.run_sweep(vec![account("AB12345", 19.0)]).await.unwrap();

        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::WaitingPayment);
        assert_eq!(stats.below_threshold, 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn at_threshold_completes_with_observed_balance() {
        let (store, notifier, engine) = setup().await;
        waiting_session(&store, 42, "AB12345").await;

        let stats = engine.run_sweep(vec![account("AB12345", 20.0)]).await.unwrap();

        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.confirmed_balance, Some(20.0));
        assert!(session.payment_confirmed_at.is_some());
        assert_eq!(stats.completed, 1);
        assert_eq!(notifier.sent(), vec![42]);
    }

    #[tokio::test]
    async fn unknown_account_keeps_session_waiting() {
        let (store, notifier, engine) = setup().await;
        waiting_session(&store, 42, "UNSEEN1").await;

        let stats = engine.run_sweep(vec![]).await.unwrap();

        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::WaitingPayment);
        assert_eq!(stats.not_found, 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let (store, notifier, engine) = setup().await;
        waiting_session(&store, 42, "AB12345").await;

        engine.run_sweep(vec![account("AB12345", 25.0)]).await.unwrap();
        let stats = engine.run_sweep(vec![account("AB12345", 25.0)]).await.unwrap();

        assert_eq!(stats.completed, 0);
        assert_eq!(notifier.sent(), vec![42], "exactly one notification");
        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn notification_failure_does_not_roll_back() {
        let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let notifier = MockNotifier::failing();
        let engine = Engine::new(Arc::clone(&store), notifier.clone(), 20.0);
        waiting_session(&store, 42, "AB12345").await;

        let stats = engine.run_sweep(vec![account("AB12345", 30.0)]).await.unwrap();

        assert_eq!(stats.completed, 1);
        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn sessions_are_processed_independently() {
        let (store, notifier, engine) = setup().await;
        waiting_session(&store, 1, "LOW0001").await;
        waiting_session(&store, 2, "HIGH001").await;
        waiting_session(&store, 3, "HIGH002").await;

        let stats = engine
            .run_sweep(vec![
                account("LOW0001", 1.0),
                account("HIGH001", 50.0),
                account("HIGH002", 20.0),
            ])
            .await
            .unwrap();

        assert_eq!(stats.completed, 2);
        assert_eq!(stats.below_threshold, 1);
        assert_eq!(notifier.sent(), vec![2, 3]);
    }

    #[tokio::test]
    async fn ingestion_derives_register_time_text() {
        let (store, _notifier, engine) = setup().await;

        engine.run_sweep(vec![account("AB12345", 1.0)]).await.unwrap();

        let stored = store.get_account("AB12345").await.unwrap().unwrap();
        let text = stored.register_time_text.unwrap();
        // %Y-%m-%d %H:%M:%S
        assert_eq!(text.len(), 19);
        assert_eq!(&text[4..5], "-");
    }

    #[tokio::test]
    async fn waiting_session_without_account_id_is_skipped() {
        let (store, notifier, engine) = setup().await;
        store
            .apply_transition(42, SessionState::WaitingPayment, &SessionPatch::default())
            .await
            .unwrap();

        let stats = engine.run_sweep(vec![]).await.unwrap();

        assert_eq!(stats.completed, 0);
        assert!(notifier.sent().is_empty());
        let session = store.get_session(42).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::WaitingPayment);
    }
}
