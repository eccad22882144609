use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::client::Client;
use crate::driver::Driver;
use crate::error::SqlMiddlewareDbError;
use crate::types::EngineKind;

pub const DEFAULT_POOL_MAX_SIZE: u32 = 4;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 32;
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 100;

/// Client settings. Every field has a default, so `{}` is a valid JSON config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub engine: EngineKind,
    pub pool_max_size: u32,
    pub connection_timeout_ms: u64,
    /// Rows a stream may fetch ahead of its consumer
    pub stream_buffer_size: usize,
    /// Tuples a write sink accumulates before flushing a batch
    pub write_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Remote,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON config document.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ConfigError`] on malformed JSON or unknown engine names.
    pub fn from_json_str(json: &str) -> Result<Self, SqlMiddlewareDbError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SqlMiddlewareDbError::ConfigError(format!("invalid client config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ConfigError`] if a size is zero.
    pub fn validate(&self) -> Result<(), SqlMiddlewareDbError> {
        if self.pool_max_size == 0 {
            return Err(SqlMiddlewareDbError::ConfigError(
                "pool_max_size must be at least 1".into(),
            ));
        }
        if self.stream_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(SqlMiddlewareDbError::ConfigError(
                "buffer sizes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    #[must_use]
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            buffer_size: self.stream_buffer_size,
        }
    }

    #[must_use]
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            buffer_size: self.write_buffer_size,
        }
    }
}

/// Flow control for row streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Most rows fetched but not yet consumed
    pub buffer_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
        }
    }
}

impl StreamOptions {
    #[must_use]
    pub fn buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }
}

/// Batching for write sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub buffer_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl WriteOptions {
    #[must_use]
    pub fn buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }
}

/// Per-query conversion options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Strip the blank padding of fixed-width `CHAR` columns
    pub trim: bool,
}

impl QueryOptions {
    #[must_use]
    pub fn trimmed() -> Self {
        Self { trim: true }
    }
}

/// Fluent builder for [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn pool_max_size(mut self, size: u32) -> Self {
        self.config.pool_max_size = size;
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn stream_buffer_size(mut self, size: usize) -> Self {
        self.config.stream_buffer_size = size;
        self
    }

    #[must_use]
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    #[must_use]
    pub fn finish(self) -> ClientConfig {
        self.config
    }

    /// Build a client over the remote engine reached through `driver`.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the configuration is invalid or pool creation fails.
    pub async fn build(self, driver: Arc<dyn Driver>) -> Result<Client, SqlMiddlewareDbError> {
        let mut config = self.config;
        config.engine = EngineKind::Remote;
        Client::from_config(config, Some(driver)).await
    }

    /// Build a client over the in-process engine.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the configuration is invalid or the engine cannot start.
    #[cfg(feature = "sqlite")]
    pub async fn build_in_memory(self) -> Result<Client, SqlMiddlewareDbError> {
        let mut config = self.config;
        config.engine = EngineKind::InMemory;
        Client::from_config(config, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults() {
        let config = ClientConfig::from_json_str(r#"{"engine": "in-memory", "pool_max_size": 2}"#)
            .unwrap();
        assert_eq!(config.engine, EngineKind::InMemory);
        assert_eq!(config.pool_max_size, 2);
        assert_eq!(config.stream_buffer_size, DEFAULT_STREAM_BUFFER_SIZE);
        assert_eq!(config.write_buffer_size, DEFAULT_WRITE_BUFFER_SIZE);
    }

    #[test]
    fn json_config_rejects_bad_values() {
        assert!(ClientConfig::from_json_str(r#"{"engine": "mainframe"}"#).is_err());
        assert!(ClientConfig::from_json_str(r#"{"stream_buffer_size": 0}"#).is_err());
    }

    #[test]
    fn builder_overrides() {
        let config = ClientBuilder::new()
            .pool_max_size(8)
            .connection_timeout(Duration::from_secs(2))
            .stream_buffer_size(5)
            .finish();
        assert_eq!(config.pool_max_size, 8);
        assert_eq!(config.connection_timeout_ms, 2_000);
        assert_eq!(config.stream_options().buffer_size, 5);
    }
}
