//! Long-running loops — inbound event consumption and reconciliation.
//!
//! Two independent tokio tasks, each with a shutdown flag. Single-cycle
//! functions (`process_inbound_batch`, `reconcile_once`) carry the actual
//! logic so tests can drive them directly; the spawned loops only add
//! cadence and fixed-backoff retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::activity::ActivityClient;
use crate::channels::{EventPayload, MessageSink, OutboundMessage, UpdateSource};
use crate::conversation::{self, prompts};
use crate::error::Error;
use crate::reconcile::{self, SweepStats};
use crate::store::RecordStore;

/// Cadence settings for the inbound loop.
#[derive(Debug, Clone)]
pub struct InboundLoopConfig {
    /// Maximum events per batch.
    pub batch_limit: u32,
    /// Throttle between batches.
    pub idle_delay: Duration,
    /// Sleep after a transient failure.
    pub error_delay: Duration,
}

/// Everything the inbound loop needs.
pub struct InboundDeps {
    pub source: Arc<dyn UpdateSource>,
    pub sink: Arc<dyn MessageSink>,
    pub engine: Arc<conversation::Engine>,
    pub store: Arc<dyn RecordStore>,
}

/// Spawn the inbound loop. Set the returned flag to stop it.
pub fn spawn_inbound_loop(
    deps: InboundDeps,
    config: InboundLoopConfig,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Inbound loop started");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Inbound loop shutting down");
                return;
            }

            match process_inbound_batch(&deps, config.batch_limit).await {
                Ok(count) => {
                    if count > 0 {
                        debug!(count, "Inbound batch processed");
                    }
                    tokio::time::sleep(config.idle_delay).await;
                }
                Err(e) => {
                    warn!(error = %e, "Inbound batch failed, retrying");
                    tokio::time::sleep(config.error_delay).await;
                }
            }
        }
    });

    (handle, shutdown_flag)
}

/// Fetch one batch above the persisted Cursor and process it in order.
///
/// Every event is accounted for before the Cursor advances past it: a
/// poison event is logged and skipped, never retried, so the loop always
/// makes forward progress. Returns the number of events consumed.
pub async fn process_inbound_batch(deps: &InboundDeps, limit: u32) -> Result<usize, Error> {
    let mut offset = deps.store.load_cursor().await?;

    let events = deps.source.fetch_updates(offset, limit).await?;
    if events.is_empty() {
        return Ok(0);
    }

    debug!(count = events.len(), offset, "Received inbound events");

    for event in &events {
        match &event.payload {
            EventPayload::Unsupported => {
                debug!(update_id = event.update_id, "Skipping unsupported update");
            }
            _ => match deps.engine.handle_event(event).await {
                Ok(replies) => {
                    for reply in &replies {
                        if let Err(e) = deps.sink.send(event.chat_id, reply).await {
                            error!(chat_id = event.chat_id, error = %e, "Reply send failed");
                        }
                    }
                }
                Err(e) => {
                    // Skip the poison event; tell the user something broke.
                    error!(
                        update_id = event.update_id,
                        chat_id = event.chat_id,
                        error = %e,
                        "Event processing failed, skipping"
                    );
                    let _ = deps
                        .sink
                        .send(event.chat_id, &OutboundMessage::text(prompts::ERROR_REPLY))
                        .await;
                }
            },
        }
        offset = event.update_id + 1;
    }

    deps.store.advance_cursor(offset).await?;
    Ok(events.len())
}

/// Spawn the reconciliation loop. Set the returned flag to stop it.
pub fn spawn_reconcile_loop(
    client: Arc<ActivityClient>,
    engine: Arc<reconcile::Engine>,
    store: Arc<dyn RecordStore>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Reconciliation loop started");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Reconciliation loop shutting down");
                return;
            }

            match reconcile_once(&client, &engine, store.as_ref()).await {
                Ok(stats) => {
                    debug!(?stats, "Reconciliation cycle done");
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation cycle failed, will retry");
                }
            }

            tokio::time::sleep(interval).await;
        }
    });

    (handle, shutdown_flag)
}

/// One full cycle: paginated fetch, then the promotion sweep.
pub async fn reconcile_once(
    client: &ActivityClient,
    engine: &reconcile::Engine,
    store: &dyn RecordStore,
) -> Result<SweepStats, Error> {
    let fetched = client.fetch_all(store).await?;
    engine.run_sweep(fetched).await
}

// ── Tests ───────────────────────────────────────────────────────────
