// ABOUTME: Interaction history route returning the caller's logged API requests
// ABOUTME: Entries are newest first and never include other users' activity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::database::ApiRequestRecord;
use crate::errors::AppError;
use crate::resources::ServerResources;

/// Response of `GET /interactions`
#[derive(Debug, Serialize, Deserialize)]
pub struct InteractionsResponse {
    /// Logged requests, newest first
    pub interactions: Vec<ApiRequestRecord>,
}

/// Interaction routes implementation
pub struct InteractionRoutes;

impl InteractionRoutes {
    /// Create the interaction routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/interactions", get(Self::handle_list))
            .with_state(resources)
    }

    /// Handle GET /interactions
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let user = authenticate(&headers, resources.verifier.as_ref()).await?;
        let interactions = resources
            .database
            .get_interactions_for_user(&user.uid)
            .await?;
        Ok((StatusCode::OK, Json(InteractionsResponse { interactions })).into_response())
    }
}
