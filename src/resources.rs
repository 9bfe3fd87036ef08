// ABOUTME: Shared resources handed to every HTTP handler through axum state
// ABOUTME: Collaborators are trait objects so routes can be exercised without external services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::classifier::FoodClassifier;
use crate::database::Database;
use crate::messaging::CalorieRequestQueue;
use crate::rate_limiting::RateLimiter;
use crate::security::ImageValidator;

/// Everything a request handler may need, created once at startup
pub struct ServerResources {
    /// Prediction store and request log
    pub database: Database,
    /// ID token verification
    pub verifier: Arc<dyn TokenVerifier>,
    /// Food image classifier
    pub classifier: Arc<dyn FoodClassifier>,
    /// Publisher for `calorie_request`
    pub publisher: Arc<dyn CalorieRequestQueue>,
    /// Upload checks
    pub validator: ImageValidator,
    /// Per-client throttling
    pub rate_limiter: Arc<RateLimiter>,
}

impl ServerResources {
    /// Bundle the collaborators
    #[must_use]
    pub fn new(
        database: Database,
        verifier: Arc<dyn TokenVerifier>,
        classifier: Arc<dyn FoodClassifier>,
        publisher: Arc<dyn CalorieRequestQueue>,
        validator: ImageValidator,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            database,
            verifier,
            classifier,
            publisher,
            validator,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
