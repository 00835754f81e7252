//! Notification worker: wiring and run loop.

pub mod consumer;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use core_config::redis::RedisConfig;
use core_config::{env_or_default, env_parse_or_default, Environment, FromEnv};
use domain_notifications::{
    bootstrap, EmailProvider, EventPublisher, HandlerConfig, InMemoryPreferencesStore,
    InMemoryRequestStore, PreferencesStore, RedisStreamPublisher, RequestStore, SmtpConfig,
    SmtpProvider, TemplateEngine,
};
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let redis_config = RedisConfig::from_env()?;
    let smtp_config = SmtpConfig::from_env();

    info!(environment = ?environment, "Starting notification worker");

    let client = redis::Client::open(redis_config.uri.as_str())?;
    let redis = ConnectionManager::new(client).await?;

    let templates = TemplateEngine::new()?;
    let smtp = SmtpProvider::new(smtp_config, templates)?;
    if let Err(e) = smtp.health_check().await {
        // Sends will come back as failures and get retried; don't refuse to start.
        warn!(error = %e, "SMTP connection check failed");
    }
    let email_provider: Arc<dyn EmailProvider> = Arc::new(smtp);
    let publisher: Arc<dyn EventPublisher> = Arc::new(RedisStreamPublisher::new(
        redis.clone(),
        redis_config.outgoing_stream.clone(),
        redis_config.max_stream_length,
    ));

    let preferences_store: Arc<dyn PreferencesStore> =
        Arc::new(InMemoryPreferencesStore::default());
    let request_store: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::default());

    let handler_config = HandlerConfig {
        frontend_url: env_or_default("FRONTEND_URL", "http://localhost:3000"),
        service_name: env_or_default("SERVICE_NAME", "Notification Service"),
    };

    let bus = Arc::new(bootstrap::message_bus(
        preferences_store,
        request_store.clone(),
        email_provider,
        publisher,
        handler_config,
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let consumer_config = consumer::ConsumerConfig::from_config(&redis_config)?;
    let event_consumer = consumer::EventConsumer::new(redis, consumer_config, bus.clone());

    let retry_interval = Duration::from_secs(env_parse_or_default("RETRY_SCAN_INTERVAL_SECS", 60)?);

    tokio::try_join!(
        event_consumer.run(shutdown_rx.clone()),
        retry::run_retry_scan(bus, request_store, retry_interval, shutdown_rx),
    )?;

    info!("Notification worker stopped");
    Ok(())
}
