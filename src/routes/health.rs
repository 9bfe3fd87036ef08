// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Liveness answers unconditionally; readiness also pings the database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Health check routes
//!
//! Neither endpoint requires authentication or counts against the rate limit.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tracing::warn;

use crate::resources::ServerResources;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/ready", get(Self::handle_ready))
            .with_state(resources)
    }

    async fn handle_health() -> Json<serde_json::Value> {
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    async fn handle_ready(
        State(resources): State<Arc<ServerResources>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        match resources.database.ping().await {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({
                    "status": "ready",
                    "timestamp": chrono::Utc::now().to_rfc3339()
                })),
            ),
            Err(e) => {
                warn!(error = %e, "Readiness check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "status": "unavailable",
                        "reason": "database unreachable",
                        "timestamp": chrono::Utc::now().to_rfc3339()
                    })),
                )
            }
        }
    }
}
