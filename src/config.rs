//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::FailMode;

/// Main configuration for a Tollgate deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Shared bucket store configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// One limiter per guarded route
    #[serde(default = "default_routes")]
    pub routes: Vec<LimiterConfig>,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            routes: default_routes(),
        }
    }
}

fn default_routes() -> Vec<LimiterConfig> {
    vec![
        LimiterConfig {
            max_tokens: 5,
            refill_window_secs: 30,
            route_name: "limited".to_string(),
            fail_mode: FailMode::Closed,
            ..LimiterConfig::default()
        },
        LimiterConfig {
            max_tokens: 2,
            refill_window_secs: 30,
            route_name: "limited_1".to_string(),
            fail_mode: FailMode::Closed,
            ..LimiterConfig::default()
        },
    ]
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Reconnect attempts per connection before an evaluation fails
    #[serde(default = "default_connect_retries")]
    pub connect_retries: usize,

    /// Bound on establishing one connection, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_retries: default_connect_retries(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// The connection timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_connect_retries() -> usize {
    2
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

/// Configuration for a single route's limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Bucket capacity, and the number of tokens added per elapsed window
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// Length of one refill window in seconds
    #[serde(default = "default_refill_window_secs")]
    pub refill_window_secs: u64,

    /// Namespace for this limiter's bucket keys
    #[serde(default = "default_route_name")]
    pub route_name: String,

    /// What to do when both the store and the local fallback say no
    #[serde(default)]
    pub fail_mode: FailMode,

    /// Upper bound on one store round trip before falling back
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_window_secs: default_refill_window_secs(),
            route_name: default_route_name(),
            fail_mode: FailMode::default(),
            remote_timeout_ms: default_remote_timeout_ms(),
        }
    }
}

fn default_max_tokens() -> u64 {
    10
}

fn default_refill_window_secs() -> u64 {
    60
}

fn default_route_name() -> String {
    "default".to_string()
}

fn default_remote_timeout_ms() -> u64 {
    250
}

impl LimiterConfig {
    /// Create a configuration for `route_name` with the given bucket shape.
    pub fn new(route_name: &str, max_tokens: u64, refill_window_secs: u64) -> Self {
        Self {
            max_tokens,
            refill_window_secs,
            route_name: route_name.to_string(),
            ..Self::default()
        }
    }

    /// Set the fail mode.
    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    /// Set the remote timeout in milliseconds.
    pub fn with_remote_timeout_ms(mut self, remote_timeout_ms: u64) -> Self {
        self.remote_timeout_ms = remote_timeout_ms;
        self
    }

    /// The remote timeout as a `Duration`.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Check the configuration for values no limiter can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(TollgateError::Config(format!(
                "route '{}': max_tokens must be positive",
                self.route_name
            )));
        }
        if self.refill_window_secs == 0 {
            return Err(TollgateError::Config(format!(
                "route '{}': refill_window_secs must be positive",
                self.route_name
            )));
        }
        if self.remote_timeout_ms == 0 {
            return Err(TollgateError::Config(format!(
                "route '{}': remote_timeout_ms must be positive",
                self.route_name
            )));
        }
        if self.route_name.is_empty() {
            return Err(TollgateError::Config(
                "route_name must not be empty".to_string(),
            ));
        }
        // The route is the only key segment that cannot carry a ':' or
        // identities could masquerade as other routes.
        if self.route_name.contains(':') {
            return Err(TollgateError::Config(format!(
                "route '{}': route_name must not contain ':'",
                self.route_name
            )));
        }
        Ok(())
    }
}

impl TollgateConfig {
    /// Load configuration from a file, with `TOLLGATE__*` environment overrides.
    ///
    /// `TOLLGATE__REDIS__URL=redis://cache:6379` overrides `redis.url`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("TOLLGATE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| TollgateError::Config(e.to_string()))?;

        let config: TollgateConfig = settings
            .try_deserialize()
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every route and reject duplicate route names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !seen.insert(route.route_name.as_str()) {
                return Err(TollgateError::Config(format!(
                    "route '{}' is configured more than once",
                    route.route_name
                )));
            }
        }
        Ok(())
    }

    /// Get the limiter configuration for a route.
    pub fn route(&self, route_name: &str) -> Option<&LimiterConfig> {
        self.routes.iter().find(|r| r.route_name == route_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_defaults() {
        let config = LimiterConfig::default();
        assert_eq!(config.max_tokens, 10);
        assert_eq!(config.refill_window_secs, 60);
        assert_eq!(config.route_name, "default");
        assert_eq!(config.fail_mode, FailMode::Open);
        assert_eq!(config.remote_timeout(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_max_tokens() {
        let config = LimiterConfig::new("api", 0, 60);
        assert!(matches!(config.validate(), Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_refill_window() {
        let config = LimiterConfig::new("api", 10, 0);
        assert!(matches!(config.validate(), Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = LimiterConfig::new("api", 10, 60).with_remote_timeout_ms(0);
        assert!(matches!(config.validate(), Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_route_names() {
        assert!(LimiterConfig::new("", 10, 60).validate().is_err());
        assert!(LimiterConfig::new("a:b", 10, 60).validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
redis:
  url: redis://cache:6379/2
routes:
  - route_name: login
    max_tokens: 3
    refill_window_secs: 10
    fail_mode: closed
  - route_name: search
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379/2");

        let login = config.route("login").unwrap();
        assert_eq!(login.max_tokens, 3);
        assert_eq!(login.refill_window_secs, 10);
        assert_eq!(login.fail_mode, FailMode::Closed);

        let search = config.route("search").unwrap();
        assert_eq!(search.max_tokens, 10);
        assert_eq!(search.fail_mode, FailMode::Open);

        assert!(config.route("missing").is_none());
    }

    #[test]
    fn test_yaml_rejects_negative_tokens() {
        let yaml = r#"
routes:
  - route_name: login
    max_tokens: -1
"#;
        assert!(TollgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_yaml_rejects_duplicate_routes() {
        let yaml = r#"
routes:
  - route_name: login
  - route_name: login
"#;
        assert!(TollgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_default_routes() {
        let config = TollgateConfig::default();
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.route("limited").unwrap().max_tokens, 5);
        assert_eq!(config.route("limited_1").unwrap().max_tokens, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tollgate-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "routes:\n  - route_name: upload\n    max_tokens: 7\n    refill_window_secs: 15\n",
        )
        .unwrap();

        let config = TollgateConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let upload = config.route("upload").unwrap();
        assert_eq!(upload.max_tokens, 7);
        assert_eq!(upload.refill_window_secs, 15);
    }
}
