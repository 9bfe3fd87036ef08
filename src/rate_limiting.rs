// ABOUTME: Fixed-window request throttling keyed by client address and route
// ABOUTME: Axum middleware answers 429 with Retry-After once a client exhausts its window
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Rate Limiting
//!
//! Each client address gets `requests_per_window` requests per window
//! (5 per minute by default) on every route, counted separately per method
//! and matched path. Counters live in a [`DashMap`] so concurrent
//! requests from different clients never contend on one lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header::RETRY_AFTER, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;

/// Counters are purged once this many clients are tracked
const PURGE_THRESHOLD: usize = 10_000;

/// Key used when the peer address is unknown
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Remaining allowance after an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
}

/// Per-client fixed-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Limiter enforcing `config`
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Count one request from `client`
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` when the client's window is used up
    pub fn check(&self, client: &str) -> AppResult<RateLimitStatus> {
        let limit = self.config.requests_per_window;
        if !self.config.enabled {
            return Ok(RateLimitStatus {
                limit,
                remaining: limit,
            });
        }

        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired();
        }

        let now = Instant::now();
        let mut window = self.windows.entry(client.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.config.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= limit {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(window.started));
            drop(window);
            AppLogger::log_security_event("rate_limit_exceeded", "low", client, None);
            return Err(AppError::rate_limit_exceeded(limit, ceil_secs(retry_after)));
        }

        window.count += 1;
        Ok(RateLimitStatus {
            limit,
            remaining: limit - window.count,
        })
    }

    /// Drop windows that have already ended
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
        debug!(tracked = self.windows.len(), "Purged expired rate limit windows");
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Client address of a request, when the server was started with connect info
#[must_use]
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |info| info.0.ip().to_string())
}

/// Counter key: client address, method and matched route template
#[must_use]
pub fn limit_key(request: &Request) -> String {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    format!("{} {} {route}", client_key(request), request.method())
}

/// Axum middleware applying [`RateLimiter`] to every request it wraps
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = limit_key(&request);
    match limiter.check(&key) {
        Ok(status) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
            response
        }
        Err(e) => {
            let retry_after = e
                .context
                .details
                .get("retry_after_secs")
                .and_then(serde_json::Value::as_u64);
            let mut response = e.into_response();
            if let Some(secs) = retry_after {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(secs));
            }
            response
        }
    }
}
