// ABOUTME: Main library entry point for the Thermitrack food recognition platform
// ABOUTME: Provides the HTTP API, the RabbitMQ calorie pipeline and the BitNet inference adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # Thermitrack
//!
//! Food image recognition with asynchronous calorie estimation.
//!
//! ## Architecture
//!
//! The system is three processes sharing this library:
//! - **`thermitrack-server`**: HTTP API. Authenticates users with Firebase ID tokens,
//!   classifies uploaded images, stores prediction records and publishes a
//!   calorie request per prediction.
//! - **`calorie-worker`**: consumes `calorie_request`, runs the BitNet inference
//!   process, publishes the estimate to `calorie_response`.
//! - **`calorie-listener`**: consumes `calorie_response` and writes the calorie
//!   value onto the prediction record.
//!
//! Requests flow `Publisher -> calorie_request -> Request Worker -> calorie_response
//! -> Response Worker -> record store`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use thermitrack::config::environment::ServerConfig;
//! use thermitrack::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Thermitrack configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Firebase bearer-token authentication
pub mod auth;

/// Food image classifier client
pub mod classifier;

/// Environment-driven configuration
pub mod config;

/// Application constants and queue names
pub mod constants;

/// `SQLite` prediction store and request log
pub mod database;

/// Unified error handling
pub mod errors;

/// Calorie inference from a food label
pub mod inference;

/// Structured logging setup
pub mod logging;

/// Queue messages, broker abstraction and the `RabbitMQ` adapter
pub mod messaging;

/// Per-client request throttling
pub mod rate_limiting;

/// Shared server resources for dependency injection
pub mod resources;

/// `HTTP` routes
pub mod routes;

/// Upload validation
pub mod security;

/// Calorie request and response workers
pub mod workers;
