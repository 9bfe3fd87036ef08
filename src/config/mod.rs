// ABOUTME: Configuration management module for centralized service settings
// ABOUTME: Re-exports the environment-driven configs used by the API and the calorie workers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors
//! Configuration module for Thermitrack
//!
//! All settings come from environment variables with documented defaults.
//! Each binary loads only the sub-configs it uses, so a worker never fails on
//! an unrelated API variable.

/// Environment and server configuration
pub mod environment;

pub use environment::{
    BrokerConfig, ClassifierConfig, DatabaseConfig, DatabaseUrl, Environment, FirebaseConfig,
    InferenceConfig, RateLimitConfig, ReconnectPolicy, ServerConfig, UploadConfig, WorkerConfig,
};
