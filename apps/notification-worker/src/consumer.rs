//! Incoming-event consumer.
//!
//! Reads user events from the incoming Redis stream with a consumer group
//! and feeds them through the message bus. Entries are acknowledged whether
//! handling succeeded or not: event dispatch is fire-and-forget, and
//! redelivering a malformed or rejected entry would not change the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use core_config::redis::RedisConfig;
use core_config::{env_parse_or_default, ConfigError};
use domain_notifications::{Event, MessageBus};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the event consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream_name: String,
    pub consumer_group: String,
    pub consumer_id: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl ConsumerConfig {
    pub fn from_config(redis: &RedisConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            stream_name: redis.incoming_stream.clone(),
            consumer_group: redis.consumer_group.clone(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: env_parse_or_default("EVENT_BATCH_SIZE", 10)?,
            poll_interval: Duration::from_millis(env_parse_or_default(
                "EVENT_POLL_INTERVAL_MS",
                500,
            )?),
        })
    }
}

/// Consumes incoming events and dispatches them through the bus.
pub struct EventConsumer {
    redis: ConnectionManager,
    config: ConsumerConfig,
    bus: Arc<MessageBus>,
}

impl EventConsumer {
    pub fn new(redis: ConnectionManager, config: ConsumerConfig, bus: Arc<MessageBus>) -> Self {
        Self { redis, config, bus }
    }

    /// Run the consume loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> eyre::Result<()> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            "Starting event consumer"
        );

        self.ensure_consumer_group().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.process_batch().await {
                if e.to_string().contains("NOGROUP") {
                    warn!("Consumer group missing, recreating");
                    if let Err(create_err) = self.ensure_consumer_group().await {
                        error!(error = %create_err, "Failed to recreate consumer group");
                    }
                } else {
                    error!(error = %e, "Error processing event batch");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Event consumer stopped");
        Ok(())
    }

    async fn ensure_consumer_group(&self) -> eyre::Result<()> {
        let mut conn = self.redis.clone();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!("Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn process_batch(&self) -> eyre::Result<()> {
        let mut conn = self.redis.clone();

        let opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_id)
            .count(self.config.batch_size);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.config.stream_name], &[">"], &opts)
            .await?;

        for stream_key in reply.keys {
            if !stream_key.ids.is_empty() {
                debug!(count = stream_key.ids.len(), "Received incoming events");
            }
            for entry in stream_key.ids {
                self.process_entry(&entry.id, &entry.map).await;
            }
        }

        Ok(())
    }

    async fn process_entry(&self, entry_id: &str, map: &HashMap<String, redis::Value>) {
        match parse_event(map) {
            Ok(event) => {
                info!(
                    entry_id = %entry_id,
                    event_type = %event.event_type(),
                    correlation_id = %event.meta().correlation_id,
                    "Dispatching incoming event"
                );
                if let Err(e) = self.bus.handle(event).await {
                    error!(entry_id = %entry_id, error = %e, "Failed to handle incoming event");
                }
            }
            Err(e) => {
                warn!(entry_id = %entry_id, error = %e, "Skipping malformed event entry");
            }
        }

        if let Err(e) = self.ack(entry_id).await {
            error!(entry_id = %entry_id, error = %e, "Failed to ACK entry");
        }
    }

    async fn ack(&self, entry_id: &str) -> eyre::Result<()> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .xack(
                &self.config.stream_name,
                &self.config.consumer_group,
                &[entry_id],
            )
            .await?;
        debug!(entry_id = %entry_id, "Acknowledged entry");
        Ok(())
    }
}

/// Parse an `Event` from the `event` field of a stream entry.
fn parse_event(map: &HashMap<String, redis::Value>) -> eyre::Result<Event> {
    let value = map
        .get("event")
        .ok_or_else(|| eyre::eyre!("missing 'event' field in stream entry"))?;

    let payload = match value {
        redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
        redis::Value::SimpleString(s) => s.clone(),
        _ => eyre::bail!("invalid 'event' field type"),
    };

    Ok(serde_json::from_str(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_notifications::events::{EventMeta, UserRegistered};

    #[test]
    fn test_parse_event_from_stream_entry() {
        let event = Event::UserRegistered(UserRegistered {
            meta: EventMeta::new(),
            userid: "a1b2c3d4e5f6789012345678901234ab".to_string(),
            username: "marge".to_string(),
            email: "marge@example.com".to_string(),
        });
        let payload = serde_json::to_string(&event).unwrap();
        let map = HashMap::from([(
            "event".to_string(),
            redis::Value::BulkString(payload.into_bytes()),
        )]);

        let parsed = parse_event(&map).unwrap();
        assert_eq!(parsed.event_type(), "user.registered");
    }

    #[test]
    fn test_parse_event_missing_field() {
        let err = parse_event(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("missing 'event' field"));
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        let map = HashMap::from([(
            "event".to_string(),
            redis::Value::BulkString(b"not json".to_vec()),
        )]);
        assert!(parse_event(&map).is_err());
    }
}
