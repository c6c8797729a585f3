use std::sync::Arc;
use std::sync::atomic::Ordering;

use vip_onboard::activity::{ActivityClient, ActivityClientConfig};
use vip_onboard::channels::TelegramChannel;
use vip_onboard::config::Config;
use vip_onboard::conversation;
use vip_onboard::reconcile::{self, CompletionNotifier};
use vip_onboard::runtime::{
    InboundDeps, InboundLoopConfig, spawn_inbound_loop, spawn_reconcile_loop,
};
use vip_onboard::store::{LibSqlBackend, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🤖 vip-onboard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Activity API: {}", config.api_base_url);
    eprintln!("   Threshold: {}", config.payment_threshold);
    eprintln!("   Stop policy: {:?}", config.termination);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Store ───────────────────────────────────────────────────────
    let store: Arc<dyn RecordStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    // ── Channel ─────────────────────────────────────────────────────
    let channel = Arc::new(TelegramChannel::new(
        config.bot_token.clone(),
        config.inbound_poll_timeout_secs,
    ));
    channel.health_check().await.unwrap_or_else(|e| {
        eprintln!("Error: Telegram health check failed: {e}");
        std::process::exit(1);
    });
    eprintln!("   Telegram: connected");

    // ── Engines ─────────────────────────────────────────────────────
    let conversation_engine = Arc::new(conversation::Engine::new(
        Arc::clone(&store),
        config.uid_image_path.clone(),
    ));

    let notifier = Arc::new(CompletionNotifier::new(channel.clone()));
    let reconcile_engine = Arc::new(reconcile::Engine::new(
        Arc::clone(&store),
        notifier,
        config.payment_threshold,
    ));

    let activity_client = Arc::new(ActivityClient::new(ActivityClientConfig {
        api_key: config.api_key.clone(),
        api_secret: config.api_secret.clone(),
        base_url: config.api_base_url.clone(),
        page_size: config.page_size,
        page_delay: config.page_delay,
        termination: config.termination.clone(),
        dedup: config.dedup,
    }));

    // ── Loops ───────────────────────────────────────────────────────
    let (inbound_handle, inbound_shutdown) = spawn_inbound_loop(
        InboundDeps {
            source: channel.clone(),
            sink: channel.clone(),
            engine: conversation_engine,
            store: Arc::clone(&store),
        },
        InboundLoopConfig {
            batch_limit: config.inbound_batch_limit,
            idle_delay: config.inbound_idle_delay,
            error_delay: config.inbound_error_delay,
        },
    );

    let (reconcile_handle, reconcile_shutdown) = spawn_reconcile_loop(
        activity_client,
        reconcile_engine,
        Arc::clone(&store),
        config.reconcile_interval,
    );

    eprintln!("   Running. Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    inbound_shutdown.store(true, Ordering::Relaxed);
    reconcile_shutdown.store(true, Ordering::Relaxed);
    inbound_handle.abort();
    reconcile_handle.abort();

    Ok(())
}
