// ABOUTME: Route module organization for the Thermitrack HTTP API
// ABOUTME: Assembles domain routers and the shared middleware stack into one axum Router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Route module for Thermitrack
//!
//! Health endpoints are mounted outside the rate limiter; everything else is
//! throttled per client address.

/// Health check and readiness routes
pub mod health;
/// Caller's request history
pub mod interactions;
/// Upload, classification and prediction record routes
pub mod predictions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::HeaderName, HeaderValue, Method},
    middleware, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::constants::{server::REQUEST_TIMEOUT_SECS, uploads::MAX_FILES_PER_REQUEST};
use crate::rate_limiting::rate_limit_middleware;
use crate::resources::ServerResources;

pub use health::HealthRoutes;
pub use interactions::InteractionRoutes;
pub use predictions::PredictionRoutes;

/// Multipart framing allowance on top of the file payloads
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    let body_limit = resources
        .validator
        .max_file_bytes()
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let api = Router::new()
        .merge(PredictionRoutes::routes(resources.clone()))
        .merge(InteractionRoutes::routes(resources.clone()))
        .route_layer(middleware::from_fn_with_state(
            resources.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(HealthRoutes::routes(resources))
        .merge(api)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(TraceLayer::new_for_http())
}

/// CORS layer from a comma-separated origin list; empty or `*` allows any origin
pub fn setup_cors(allowed_origins: &str) -> CorsLayer {
    let allow_origin = if allowed_origins.trim().is_empty() || allowed_origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("origin"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
}
