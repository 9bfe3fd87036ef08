// ABOUTME: Food image classification contract and the prediction payload returned to clients
// ABOUTME: The vision model runs as a separate service reached through HttpFoodClassifier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

/// HTTP client for the classifier service
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;

pub use http::HttpFoodClassifier;

/// Top prediction for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodPrediction {
    /// Food label
    #[serde(rename = "Food")]
    pub food: String,
    /// Confidence of the top class
    #[serde(rename = "Confidence Score")]
    pub confidence: f64,
}

/// Classifies a food image
#[async_trait]
pub trait FoodClassifier: Send + Sync {
    /// Top food label of `image`
    ///
    /// # Errors
    ///
    /// Returns an external service error when the model cannot be reached or
    /// rejects the image
    async fn classify(&self, image: &[u8], content_type: &str) -> AppResult<FoodPrediction>;
}
