//! pairscout - new pair alerts
//!
//! Runs until killed. Only configuration problems at startup end the process.

use anyhow::Context;
use tracing::info;

use pairscout_watcher::notifier::DEFAULT_TELEGRAM_API;
use pairscout_watcher::telemetry;
use pairscout_watcher::{
    EventRouter, HoneypotClient, Pipeline, StreamConnector, TelegramNotifier, WatcherConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: no .env file loaded: {e}");
    }

    telemetry::init_from_format(std::env::var("LOG_FORMAT").ok().as_deref());

    let config = WatcherConfig::from_env().context("invalid configuration")?;

    let enricher = HoneypotClient::with_default_endpoint(config.http_timeout)
        .context("failed to build honeypot client")?;
    let notifier = TelegramNotifier::new(
        DEFAULT_TELEGRAM_API,
        config.telegram_bot_token.clone(),
        config.telegram_chat_id,
        config.http_timeout,
    )
    .context("failed to build telegram client")?;

    let router = EventRouter::new(Pipeline::new(enricher, notifier, config.enrichment_delay));
    let mut connector = StreamConnector::websocket(&config.stream_config());

    info!(
        chat_id = config.telegram_chat_id,
        reconnect_delay_ms = connector.reconnect_delay().as_millis() as u64,
        enrichment_delay_ms = config.enrichment_delay.as_millis() as u64,
        "watching factories for new pairs"
    );

    connector
        .run(|event| {
            router.dispatch(event);
        })
        .await;

    Ok(())
}
