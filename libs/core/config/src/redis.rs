use crate::{env_or_default, env_parse_or_default, env_required, ConfigError, FromEnv};

/// Redis configuration for the notification service: connection URI plus the
/// stream names used for incoming user events and outgoing domain events.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub uri: String,
    /// Stream carrying events published by the user service.
    pub incoming_stream: String,
    /// Consumer group this service reads the incoming stream with.
    pub consumer_group: String,
    /// Stream this service publishes its own domain events to.
    pub outgoing_stream: String,
    /// Approximate cap on the outgoing stream length (XADD MAXLEN ~).
    pub max_stream_length: i64,
}

impl RedisConfig {
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            incoming_stream: "user:events".to_string(),
            consumer_group: "notification_service".to_string(),
            outgoing_stream: "notification:events".to_string(),
            max_stream_length: 100_000,
        }
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_HOST to be set (no default); stream names fall back to
    /// the service conventions.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            uri: env_required("REDIS_HOST")?,
            incoming_stream: env_or_default("INCOMING_EVENT_STREAM", "user:events"),
            consumer_group: env_or_default("EVENT_CONSUMER_GROUP", "notification_service"),
            outgoing_stream: env_or_default("OUTGOING_EVENT_STREAM", "notification:events"),
            max_stream_length: env_parse_or_default("MAX_STREAM_LENGTH", 100_000)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_from_env_success() {
        temp_env::with_vars(
            [
                ("REDIS_HOST", Some("redis://localhost:6379")),
                ("INCOMING_EVENT_STREAM", None),
                ("OUTGOING_EVENT_STREAM", Some("ntfy:out")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.uri, "redis://localhost:6379");
                assert_eq!(config.incoming_stream, "user:events");
                assert_eq!(config.outgoing_stream, "ntfy:out");
                assert_eq!(config.max_stream_length, 100_000);
            },
        );
    }

    #[test]
    fn test_redis_config_from_env_missing_host() {
        temp_env::with_var_unset("REDIS_HOST", || {
            let err = RedisConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_HOST"));
        });
    }

    #[test]
    fn test_redis_config_new_defaults() {
        let config = RedisConfig::new("redis://prod-host:6379".to_string());
        assert_eq!(config.uri, "redis://prod-host:6379");
        assert_eq!(config.consumer_group, "notification_service");
    }
}
