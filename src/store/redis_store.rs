//! Redis-backed bucket store.
//!
//! The refill/consume step runs server-side as a Lua script, so every
//! process sharing the Redis instance sees one consistent bucket per key
//! pair. Both keys of a bucket are touched by a single script call; under
//! Redis Cluster they would need a shared hash tag.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisError, Script};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RedisConfig;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{BucketStore, RefillOutcome, RefillRequest, StoreError};

/// Lua transcription of [`refill_consume`](crate::ratelimit::refill_consume).
///
/// KEYS: tokens, lastRefill. ARGV: max tokens, refill window, now.
/// Returns `{allowed (0|1), remaining}`.
const REFILL_CONSUME_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local last_refill_key = KEYS[2]

local max_tokens = tonumber(ARGV[1])
local refill_window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local tokens = tonumber(redis.call("GET", tokens_key))
if tokens == nil then tokens = max_tokens end

local last_refill = tonumber(redis.call("GET", last_refill_key))
if last_refill == nil then last_refill = now end

local elapsed = math.max(0, now - last_refill)
local tokens_to_add = math.floor(elapsed / refill_window) * max_tokens
local available = math.min(max_tokens, tokens + tokens_to_add)

if available > 0 then
  available = available - 1
  redis.call("SET", tokens_key, available)
  redis.call("SET", last_refill_key, now)
  return {1, available}
end

return {0, available}
"#;

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.is_timeout() {
            StoreError::Connection(format!("timed out: {}", e))
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Protocol(e.to_string())
        }
    }
}

/// A [`BucketStore`] backed by a Redis server.
///
/// Connects lazily on first use and reconnects through
/// [`ConnectionManager`], so an unreachable Redis only fails individual
/// evaluations and never construction.
pub struct RedisBucketStore {
    client: Client,
    connection: Mutex<Option<ConnectionManager>>,
    script: Script,
    config: RedisConfig,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("config", &self.config)
            .finish()
    }
}

impl RedisBucketStore {
    /// Create a store for the configured Redis URL without connecting.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| TollgateError::Config(format!("invalid redis url '{}': {}", config.url, e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            script: Script::new(REFILL_CONSUME_SCRIPT),
            config,
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a handle to the shared connection, connecting first if needed.
    async fn connection(&self) -> std::result::Result<ConnectionManager, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }

        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(self.config.connect_retries)
            .set_connection_timeout(self.config.connect_timeout());
        let connection =
            ConnectionManager::new_with_config(self.client.clone(), manager_config).await?;
        info!(url = %self.config.url, "Connected to Redis bucket store");

        *guard = Some(connection.clone());
        Ok(connection)
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn refill_consume(
        &self,
        request: &RefillRequest,
    ) -> std::result::Result<RefillOutcome, StoreError> {
        let mut connection = self.connection().await?;

        // EVALSHA, falling back to EVAL when the script is not cached yet.
        let (allowed, remaining): (i64, i64) = self
            .script
            .key(&request.tokens_key)
            .key(&request.last_refill_key)
            .arg(request.max_tokens)
            .arg(request.refill_window_secs)
            .arg(request.now)
            .invoke_async(&mut connection)
            .await?;

        Ok(RefillOutcome {
            allowed: allowed == 1,
            remaining: remaining.max(0) as u64,
        })
    }
}
