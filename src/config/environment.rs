// ABOUTME: Environment configuration for the HTTP API and the calorie workers
// ABOUTME: One typed sub-config per concern, each loadable on its own by the binary that needs it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Environment-based configuration management for deployment
//!
//! Every binary reads only the sub-configs it needs: the HTTP API loads the full
//! [`ServerConfig`], the calorie worker loads [`BrokerConfig`], [`InferenceConfig`]
//! and a [`WorkerConfig`], the listener loads [`BrokerConfig`], [`DatabaseConfig`]
//! and a [`WorkerConfig`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{broker, inference, queues, server, uploads};

/// Environment type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite {
        /// Path of the database file
        path: PathBuf,
    },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string. Anything that is not `sqlite:` prefixed is a file path.
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database location
    pub url: DatabaseUrl,
    /// Pool size for file-backed databases
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Load from `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_MAX_CONNECTIONS` is not a number
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: DatabaseUrl::parse_url(&env_var_or("DATABASE_URL", server::DEFAULT_DATABASE_URL)),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
        })
    }

    /// In-memory configuration for tests
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            url: DatabaseUrl::Memory,
            max_connections: 1,
        }
    }
}

/// Message broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host
    pub host: String,
    /// AMQP port
    pub port: u16,
    /// User name
    pub user: String,
    /// Password
    #[serde(skip_serializing)]
    pub password: String,
    /// Heartbeat interval negotiated with the broker
    pub heartbeat_secs: u16,
    /// Destination queue of the request publisher
    pub request_queue: String,
    /// Food prediction API URL; carried for deployments, not used by the pipeline
    pub food_api_url: String,
}

impl BrokerConfig {
    /// Load broker settings from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_var_or("RABBITMQ_HOST", broker::DEFAULT_HOST),
            port: parse_env("RABBITMQ_PORT", broker::DEFAULT_PORT)?,
            user: env_var_or("RABBITMQ_USER", broker::DEFAULT_USER),
            password: env_var_or("RABBITMQ_PASSWORD", broker::DEFAULT_PASSWORD),
            heartbeat_secs: parse_env("RABBITMQ_HEARTBEAT_SECS", broker::DEFAULT_HEARTBEAT_SECS)?,
            request_queue: env_var_or("RABBITMQ_QUEUE", queues::CALORIE_REQUEST),
            food_api_url: env_var_or("FOOD_API_URL", broker::DEFAULT_FOOD_API_URL),
        })
    }

    /// AMQP URI for this broker (default vhost)
    #[must_use]
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f?heartbeat={}",
            self.user, self.password, self.host, self.port, self.heartbeat_secs
        )
    }

    /// AMQP URI with the password masked, for logs
    #[must_use]
    pub fn redacted_uri(&self) -> String {
        format!("amqp://{}:***@{}:{}/%2f", self.user, self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: broker::DEFAULT_HOST.to_owned(),
            port: broker::DEFAULT_PORT,
            user: broker::DEFAULT_USER.to_owned(),
            password: broker::DEFAULT_PASSWORD.to_owned(),
            heartbeat_secs: broker::DEFAULT_HEARTBEAT_SECS,
            request_queue: queues::CALORIE_REQUEST.to_owned(),
            food_api_url: broker::DEFAULT_FOOD_API_URL.to_owned(),
        }
    }
}

/// How a worker reacts when it cannot reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReconnectPolicy {
    /// Give up after `max_attempts` consecutive failed connects
    Bounded {
        /// Consecutive connection attempts before giving up
        max_attempts: u32,
        /// Pause between attempts
        delay: Duration,
    },
    /// Retry forever
    Unbounded {
        /// Pause between attempts
        delay: Duration,
    },
}

impl ReconnectPolicy {
    /// Pause between attempts
    #[must_use]
    pub const fn delay(&self) -> Duration {
        match self {
            Self::Bounded { delay, .. } | Self::Unbounded { delay } => *delay,
        }
    }

    /// Attempt cap, `None` when unbounded
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::Bounded { max_attempts, .. } => Some(*max_attempts),
            Self::Unbounded { .. } => None,
        }
    }

    /// Load a policy from `{prefix}_RECONNECT`, `{prefix}_MAX_RETRIES` and
    /// `{prefix}_RETRY_DELAY_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown mode, a non-numeric value or a zero attempt cap
    pub fn from_env(prefix: &str, default_mode: &str) -> Result<Self> {
        let mode = env_var_or(&format!("{prefix}_RECONNECT"), default_mode);
        let delay = Duration::from_secs(parse_env(
            &format!("{prefix}_RETRY_DELAY_SECS"),
            broker::DEFAULT_RETRY_DELAY_SECS,
        )?);

        match mode.to_lowercase().as_str() {
            "bounded" => {
                let max_attempts = parse_env(
                    &format!("{prefix}_MAX_RETRIES"),
                    broker::DEFAULT_MAX_RETRIES,
                )?;
                if max_attempts == 0 {
                    anyhow::bail!("{prefix}_MAX_RETRIES must be at least 1");
                }
                Ok(Self::Bounded {
                    max_attempts,
                    delay,
                })
            }
            "unbounded" => Ok(Self::Unbounded { delay }),
            other => anyhow::bail!(
                "Invalid {prefix}_RECONNECT value '{other}': expected 'bounded' or 'unbounded'"
            ),
        }
    }
}

/// Consumer loop settings for one worker binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Connection policy
    pub reconnect: ReconnectPolicy,
}

impl WorkerConfig {
    /// Request worker: bounded by default (10 attempts, 5 s apart)
    ///
    /// # Errors
    ///
    /// Returns an error if the policy variables are invalid
    pub fn request_worker_from_env() -> Result<Self> {
        Ok(Self {
            reconnect: ReconnectPolicy::from_env("CALORIE_WORKER", "bounded")?,
        })
    }

    /// Response worker: unbounded by default (5 s apart)
    ///
    /// # Errors
    ///
    /// Returns an error if the policy variables are invalid
    pub fn response_worker_from_env() -> Result<Self> {
        Ok(Self {
            reconnect: ReconnectPolicy::from_env("CALORIE_LISTENER", "unbounded")?,
        })
    }
}

/// Calorie inference process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Executable launched for each estimate
    pub program: String,
    /// Arguments placed before the model/prompt/token arguments
    pub script_args: Vec<String>,
    /// Working directory of the process
    pub working_dir: PathBuf,
    /// Model checkpoint passed with `-m`
    pub model_path: String,
    /// Generated token cap passed with `-n`
    pub max_tokens: u32,
    /// Hard deadline for one run
    pub timeout: Duration,
}

impl InferenceConfig {
    /// Load from `BITNET_*` variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            program: env_var_or("BITNET_PROGRAM", inference::DEFAULT_PROGRAM),
            script_args: vec![env_var_or("BITNET_SCRIPT", inference::DEFAULT_SCRIPT)],
            working_dir: PathBuf::from(env_var_or("BITNET_DIR", inference::DEFAULT_WORKING_DIR)),
            model_path: env_var_or("BITNET_MODEL_PATH", inference::DEFAULT_MODEL_PATH),
            max_tokens: parse_env("BITNET_MAX_TOKENS", inference::DEFAULT_MAX_TOKENS)?,
            timeout: Duration::from_secs(parse_env(
                "BITNET_TIMEOUT_SECS",
                inference::DEFAULT_TIMEOUT_SECS,
            )?),
        })
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            program: inference::DEFAULT_PROGRAM.to_owned(),
            script_args: vec![inference::DEFAULT_SCRIPT.to_owned()],
            working_dir: PathBuf::from(inference::DEFAULT_WORKING_DIR),
            model_path: inference::DEFAULT_MODEL_PATH.to_owned(),
            max_tokens: inference::DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(inference::DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Food classifier sidecar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Endpoint receiving raw image bytes
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl ClassifierConfig {
    /// Load from `CLASSIFIER_URL` and `CLASSIFIER_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout cannot be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env_var_or("CLASSIFIER_URL", server::DEFAULT_CLASSIFIER_URL),
            timeout: Duration::from_secs(parse_env(
                "CLASSIFIER_TIMEOUT_SECS",
                server::DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            )?),
        })
    }
}

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum size of one image in bytes
    pub max_file_bytes: usize,
    /// Accepted MIME types
    pub allowed_mime_types: Vec<String>,
    /// Accepted lowercase extensions, with leading dot
    pub allowed_extensions: Vec<String>,
}

impl UploadConfig {
    /// Load from `MAX_UPLOAD_BYTES`; type lists are fixed
    ///
    /// # Errors
    ///
    /// Returns an error if `MAX_UPLOAD_BYTES` cannot be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_file_bytes: parse_env("MAX_UPLOAD_BYTES", uploads::DEFAULT_MAX_FILE_BYTES)?,
            ..Self::default()
        })
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: uploads::DEFAULT_MAX_FILE_BYTES,
            allowed_mime_types: uploads::ALLOWED_MIME_TYPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            allowed_extensions: uploads::ALLOWED_EXTENSIONS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Per-client request throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window: Duration,
}

impl RateLimitConfig {
    /// Load from `RATE_LIMIT_ENABLED` and `RATE_LIMIT_PER_MINUTE`
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_env("RATE_LIMIT_ENABLED", true)?,
            requests_per_window: parse_env(
                "RATE_LIMIT_PER_MINUTE",
                server::DEFAULT_RATE_LIMIT_PER_MINUTE,
            )?,
            window: Duration::from_secs(60),
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: server::DEFAULT_RATE_LIMIT_PER_MINUTE,
            window: Duration::from_secs(60),
        }
    }
}

/// Firebase Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    /// Firebase project ID (required for token validation)
    pub project_id: Option<String>,
    /// Whether Firebase authentication is enabled
    pub enabled: bool,
    /// Cache TTL for Firebase public keys in seconds
    pub key_cache_ttl_secs: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            enabled: false,
            key_cache_ttl_secs: 3600,
        }
    }
}

impl FirebaseConfig {
    /// Returns `true` if Firebase is enabled and has a project ID configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.enabled && self.project_id.is_some()
    }

    /// Load Firebase configuration from environment
    ///
    /// Environment variables:
    /// - `FIREBASE_PROJECT_ID` - Firebase project ID (required for token validation)
    /// - `FIREBASE_ENABLED` - Enable Firebase authentication (default: true when a project is set)
    /// - `FIREBASE_KEY_CACHE_TTL_SECS` - Public key cache TTL (default: 3600)
    #[must_use]
    pub fn from_env() -> Self {
        let project_id = env::var("FIREBASE_PROJECT_ID").ok();

        let enabled = project_id.is_some()
            && env_var_or("FIREBASE_ENABLED", "true")
                .parse()
                .unwrap_or(true);

        if enabled {
            info!(
                project_id = project_id.as_deref().unwrap_or("(not set)"),
                "Firebase authentication enabled"
            );
        } else {
            warn!("Firebase authentication is not configured; every authenticated request will fail");
        }

        Self {
            project_id,
            enabled,
            key_cache_ttl_secs: env::var("FIREBASE_KEY_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        }
    }
}

/// Full configuration of the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Prediction store
    pub database: DatabaseConfig,
    /// Broker used by the request publisher
    pub broker: BrokerConfig,
    /// Vision sidecar
    pub classifier: ClassifierConfig,
    /// Upload validation
    pub uploads: UploadConfig,
    /// Throttling
    pub rate_limit: RateLimitConfig,
    /// Token verification
    pub firebase: FirebaseConfig,
    /// Comma-separated CORS origins, `*` for any
    pub cors_allowed_origins: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but invalid
    pub fn from_env() -> Result<Self> {
        let config = Self {
            http_port: parse_env("HTTP_PORT", server::DEFAULT_HTTP_PORT)?,
            environment: Environment::from_str_or_default(&env_var_or(
                "ENVIRONMENT",
                "development",
            )),
            database: DatabaseConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            classifier: ClassifierConfig::from_env()?,
            uploads: UploadConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            firebase: FirebaseConfig::from_env(),
            cors_allowed_origins: env_var_or("CORS_ALLOWED_ORIGINS", "*"),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error when limits are zero
    pub fn validate(&self) -> Result<()> {
        if self.uploads.max_file_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }
        if self.rate_limit.enabled && self.rate_limit.requests_per_window == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be greater than zero when rate limiting is enabled");
        }
        if self.environment.is_production() && !self.firebase.is_configured() {
            warn!("Production environment without Firebase project; all requests will be rejected");
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Thermitrack Server Configuration:\n\
             - HTTP Port: {}\n\
             - Environment: {}\n\
             - Database: {}\n\
             - Broker: {}\n\
             - Request Queue: {}\n\
             - Classifier: {}\n\
             - Max Upload: {} bytes\n\
             - Rate Limiting: {}\n\
             - CORS Origins: {}\n\
             - Firebase: {}",
            self.http_port,
            self.environment,
            self.database.url,
            self.broker.redacted_uri(),
            self.broker.request_queue,
            self.classifier.url,
            self.uploads.max_file_bytes,
            if self.rate_limit.enabled {
                format!("{}/min", self.rate_limit.requests_per_window)
            } else {
                "Disabled".to_owned()
            },
            self.cors_allowed_origins,
            if self.firebase.is_configured() {
                "Enabled"
            } else {
                "Disabled"
            },
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
