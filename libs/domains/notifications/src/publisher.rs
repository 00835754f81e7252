//! Outbound event publishing.
//!
//! Terminal domain events (`notification.sent`, `notification.failed`) are
//! forwarded to an external broker. The transport here is a capped Redis
//! stream; the trait keeps handlers ignorant of that choice.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::NotificationResult;
use crate::events::Event;

/// Fire-and-forget handoff of an event to the external broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, event: &Event) -> NotificationResult<()>;
}

/// Publishes events as JSON entries on a Redis stream, trimmed to an
/// approximate maximum length.
pub struct RedisStreamPublisher {
    redis: ConnectionManager,
    stream_name: String,
    max_stream_length: i64,
}

impl RedisStreamPublisher {
    pub fn new(redis: ConnectionManager, stream_name: String, max_stream_length: i64) -> Self {
        Self {
            redis,
            stream_name,
            max_stream_length,
        }
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish_event(&self, event: &Event) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let payload = serde_json::to_string(event)?;

        let id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_stream_length)
            .arg("*")
            .arg("event")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream_id = %id,
            event_type = %event.event_type(),
            correlation_id = %event.meta().correlation_id,
            "Published event"
        );
        Ok(())
    }
}
