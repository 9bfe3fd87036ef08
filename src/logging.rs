// ABOUTME: Logging configuration and structured logging setup for the API and the calorie workers
// ABOUTME: Configures log levels, output format and noise reduction for broker, HTTP and database crates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Structured logging shared by all three binaries

use std::env;
use std::io;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::constants::service_names;

/// Noisy dependencies and the level they are capped at
const NOISE_DIRECTIVES: &[&str] = &[
    "hyper=warn",
    "hyper::proto=warn",
    "reqwest=warn",
    "lapin=warn",
    "amq_protocol=warn",
    "pinky_swear=warn",
    "sqlx=info",
    "sqlx::query=warn",
    "tower_http=info",
];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Include span information for tracing
    pub include_spans: bool,
    /// Service name for structured logging
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (development, production)
    pub environment: String,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl LogFormat {
    /// Parse `LOG_FORMAT`, defaulting to pretty
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            include_spans: false,
            service_name: service_names::THERMITRACK_SERVER.into(),
            service_version: env!("CARGO_PKG_VERSION").to_owned(),
            environment: "development".into(),
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env(service_name: &str) -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
        let format = LogFormat::from_str_or_default(env::var("LOG_FORMAT").as_deref().unwrap_or(""));
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        // In production, use more detailed logging
        let is_production = environment == "production";

        Self {
            level,
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_spans: is_production || env::var("LOG_INCLUDE_SPANS").is_ok(),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| service_name.to_owned()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_owned()),
            environment,
        }
    }

    /// Build the filter: `RUST_LOG` (or the configured level) plus noise reduction
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let base = env::var("RUST_LOG").unwrap_or_else(|_| self.level.clone());
        let mut filter = EnvFilter::new(base);
        for directive in NOISE_DIRECTIVES {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(e) => warn!("Ignoring invalid log directive {directive}: {e}"),
            }
        }
        // Keep our application logs at desired level
        if let Ok(own) = format!("thermitrack={}", self.level).parse() {
            filter = filter.add_directive(own);
        }
        filter
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed
    pub fn init(&self) -> Result<()> {
        let registry = tracing_subscriber::registry().with(self.env_filter());
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let result = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(true)
                        .with_writer(io::stdout)
                        .with_span_events(span_events)
                        .json(),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(true)
                        .with_writer(io::stdout)
                        .with_span_events(span_events),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(io::stdout)
                        .with_span_events(FmtSpan::NONE),
                )
                .try_init(),
        };
        result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))?;

        self.log_startup_info();
        Ok(())
    }

    /// Log structured startup information
    fn log_startup_info(&self) {
        info!(
            service.name = %self.service_name,
            service.version = %self.service_version,
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "{} starting up",
            self.service_name
        );

        let config_summary = json!({
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            },
            "logging": {
                "level": self.level,
                "format": format!("{:?}", self.format),
                "features": {
                    "location": self.include_location,
                    "spans": self.include_spans
                }
            }
        });

        info!("Logging configured: {}", config_summary);
    }
}

/// Initialize logging from environment for the named service
///
/// # Errors
///
/// Returns an error if logging initialization fails
pub fn init_from_env(service_name: &str) -> Result<()> {
    LoggingConfig::from_env(service_name).init()
}

/// Application-specific logging utilities
pub struct AppLogger;

impl AppLogger {
    /// Log user authentication events
    pub fn log_auth_event(user_id: &str, event: &str, success: bool, details: Option<&str>) {
        info!(
            user.id = %user_id,
            auth.event = %event,
            auth.success = %success,
            auth.details = details.unwrap_or(""),
            "Authentication event"
        );
    }

    /// Log one step of the calorie pipeline for a prediction document
    pub fn log_pipeline_event(stage: &str, doc_id: Option<&str>, outcome: &str) {
        info!(
            pipeline.stage = %stage,
            pipeline.doc_id = doc_id.unwrap_or("(none)"),
            pipeline.outcome = %outcome,
            "Calorie pipeline event"
        );
    }

    /// Log security events
    pub fn log_security_event(
        event_type: &str,
        severity: &str,
        details: &str,
        user_id: Option<&str>,
    ) {
        warn!(
            security.event = %event_type,
            security.severity = %severity,
            security.details = %details,
            user.id = user_id.unwrap_or("unknown"),
            "Security event"
        );
    }
}
