use std::sync::Arc;

use event_booker::{
    clock::SystemClock,
    config::AppConfig,
    db::{Db, Repositories},
    engine::{BookingEngine, EngineSettings},
    logger::init_tracing,
    metrics::counters::Counters,
    notification::{
        ChannelSender, composite::CompositeNotifier, email::EmailSender,
        telegram::TelegramSender,
    },
};

/// Builds the fan-out notifier from whichever channels are configured.
fn build_notifier(cfg: &AppConfig) -> anyhow::Result<CompositeNotifier> {
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();

    if let Some(relay) = &cfg.email_relay_url {
        senders.push(Arc::new(EmailSender::new(
            relay.clone(),
            cfg.email_from.clone(),
        )?));
    }
    if let Some(token) = &cfg.telegram_bot_token {
        senders.push(Arc::new(TelegramSender::new(
            cfg.telegram_api_base.clone(),
            token.clone(),
        )?));
    }

    let notifier = CompositeNotifier::new(senders);
    if notifier.is_empty() {
        tracing::warn!("no notification channels configured; cancellation notices are disabled");
    }

    Ok(notifier)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting event booker...");

    let cfg = AppConfig::from_env();

    let db = Db::connect(&cfg.database_url, cfg.db_max_connections).await?;
    db.migrate().await?;
    tracing::info!(dialect = ?db.dialect, "database ready");

    let notifier = Arc::new(build_notifier(&cfg)?);
    let engine = BookingEngine::new(
        Repositories::sqlx(db),
        notifier,
        Arc::new(SystemClock),
        EngineSettings::from_config(&cfg)?,
        Counters::default(),
    );

    let sweeper = Arc::new(engine.sweeper()).start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    sweeper.stop().await;

    Ok(())
}
