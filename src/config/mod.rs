//! Typed configuration materialised once at startup from environment
//! variables (§6, §9 design note: "replace env-driven dict with a single
//! typed configuration record").

pub mod secrets;

use std::env;
use std::time::Duration;

use crate::domain::TIMEFRAMES;
use crate::error::PipelineError;
pub use secrets::SecretsBackend;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    fn from_env_var() -> Self {
        match env::var("ENVIRONMENT").as_deref() {
            Ok("staging") => Environment::Staging,
            Ok("production") => Environment::Production,
            Ok("test") => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub db: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub max_idle_time_ms: u64,
    pub connect_timeout_ms: u64,
    pub server_selection_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub socket_connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub socket_keepalive: bool,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub failure_window: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub exponential_base: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub window: Duration,
    pub per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    pub enabled: bool,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub mongo: MongoConfig,
    pub redis: RedisConfig,
    pub binance_api_url: String,
    pub cmc_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_price_chat_id: Option<String>,
    pub telegram_signal_chat_id: Option<String>,
    pub coins: Vec<String>,
    pub timeframes: Vec<String>,
    pub log_level: String,
    pub log_format: String,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub default_timeout: Duration,
    pub api_key: ApiKeyConfig,
    pub rate_limit: RateLimitConfig,
    pub secrets_backend: SecretsBackend,
    /// §9 open question #1: the Analyzer's dominance-interpretation
    /// threshold (originally disagreed with the source's rate-limiter
    /// threshold of 8 — both are now distinct, documented config keys).
    pub analyzer_usdt_dominance_rising_threshold: f64,
    pub dispatcher_usdt_dominance_alert_threshold: f64,
    pub tracing_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let coins = env::var("COINS")
            .unwrap_or_else(|_| "BTCUSDT,ETHUSDT,SOLUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            environment: Environment::from_env_var(),
            mongo: MongoConfig {
                uri: env_string_or("MONGODB_URI", "mongodb://localhost:27017"),
                db: env_string_or("MONGODB_DB", "market_intel"),
                max_pool_size: env_or("MONGODB_MAX_POOL_SIZE", 100),
                min_pool_size: env_or("MONGODB_MIN_POOL_SIZE", 10),
                max_idle_time_ms: env_or("MONGODB_MAX_IDLE_TIME_MS", 45_000),
                connect_timeout_ms: env_or("MONGODB_CONNECT_TIMEOUT_MS", 10_000),
                server_selection_timeout_ms: env_or("MONGODB_SERVER_SELECTION_TIMEOUT_MS", 5_000),
            },
            redis: RedisConfig {
                host: env_string_or("REDIS_HOST", "localhost"),
                port: env_or("REDIS_PORT", 6379),
                max_connections: env_or("REDIS_MAX_CONNECTIONS", 20),
                socket_connect_timeout: Duration::from_secs(env_or(
                    "REDIS_SOCKET_CONNECT_TIMEOUT",
                    5,
                )),
                socket_timeout: Duration::from_secs(env_or("REDIS_SOCKET_TIMEOUT", 5)),
                socket_keepalive: env_or("REDIS_SOCKET_KEEPALIVE", true),
            },
            binance_api_url: env_string_or("BINANCE_API_URL", "https://api.binance.com"),
            cmc_api_key: env::var("CMC_API_KEY").ok(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_price_chat_id: env::var("TELEGRAM_PRICE_CHAT_ID").ok(),
            telegram_signal_chat_id: env::var("TELEGRAM_SIGNAL_CHAT_ID").ok(),
            coins,
            timeframes: TIMEFRAMES.iter().map(|s| s.to_string()).collect(),
            log_level: env_string_or("LOG_LEVEL", "info"),
            log_format: env_string_or("LOG_FORMAT", "plain"),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_or("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5),
                recovery_timeout: Duration::from_secs(env_or(
                    "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
                    60,
                )),
                failure_window: Duration::from_secs(60),
            },
            retry: RetryConfig {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3),
                initial_delay: Duration::from_millis(env_or("RETRY_INITIAL_DELAY", 500)),
                exponential_base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            default_timeout: Duration::from_secs(env_or("DEFAULT_TIMEOUT", 10)),
            api_key: ApiKeyConfig {
                enabled: env_or("API_KEY_ENABLED", false),
                keys: env::var("API_KEYS")
                    .or_else(|_| env::var("API_KEY"))
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("RATE_LIMIT_ENABLED", true),
                requests: env_or("RATE_LIMIT_REQUESTS", 60),
                window: Duration::from_secs(60),
                per_minute: env_or("RATE_LIMIT_PER_MINUTE", 60),
            },
            secrets_backend: SecretsBackend::from_env_var(),
            analyzer_usdt_dominance_rising_threshold: env_or(
                "ANALYZER_USDT_DOMINANCE_RISING_THRESHOLD",
                5.0,
            ),
            dispatcher_usdt_dominance_alert_threshold: env_or(
                "DISPATCHER_USDT_DOMINANCE_ALERT_THRESHOLD",
                8.0,
            ),
            tracing_enabled: env_or("TRACING_ENABLED", false),
        }
    }

    /// Sanity-checks the values that, if wrong, can't be caught any other
    /// way than failing fast at startup rather than misbehaving at runtime.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Configuration {
                message: "must be at least 1".to_string(),
                config_key: Some("RETRY_MAX_ATTEMPTS".to_string()),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(PipelineError::Configuration {
                message: "must be at least 1".to_string(),
                config_key: Some("CIRCUIT_BREAKER_FAILURE_THRESHOLD".to_string()),
            });
        }
        if !matches!(self.log_format.as_str(), "plain" | "json") {
            return Err(PipelineError::Configuration {
                message: format!("unknown value '{}', expected 'plain' or 'json'", self.log_format),
                config_key: Some("LOG_FORMAT".to_string()),
            });
        }
        if self.coins.is_empty() {
            return Err(PipelineError::Configuration {
                message: "must name at least one symbol".to_string(),
                config_key: Some("COINS".to_string()),
            });
        }
        Ok(())
    }
}
