// ABOUTME: reqwest client posting raw image bytes to the food classifier service
// ABOUTME: Expects a JSON body with the top label and its confidence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FoodClassifier, FoodPrediction};
use crate::config::ClassifierConfig;
use crate::errors::{AppError, AppResult, ErrorCode};

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Response of the classifier service
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: String,
    confidence: f64,
}

/// Classifier service client
pub struct HttpFoodClassifier {
    client: Client,
    url: String,
}

impl HttpFoodClassifier {
    /// Create a client for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ClassifierConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl FoodClassifier for HttpFoodClassifier {
    async fn classify(&self, image: &[u8], content_type: &str) -> AppResult<FoodPrediction> {
        debug!(bytes = image.len(), content_type, "Sending image to classifier");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, content_type)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %self.url, "Classifier unreachable");
                AppError::new(
                    ErrorCode::ExternalServiceUnavailable,
                    format!("Food classifier unreachable: {e}"),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Classifier rejected image");
            return Err(AppError::external_service(
                "Food classifier",
                format!("Prediction failed with status {status}"),
            ));
        }

        let parsed: ClassifyResponse = response.json().await.map_err(|e| {
            AppError::external_service("Food classifier", format!("Invalid response: {e}"))
        })?;

        Ok(FoodPrediction {
            food: parsed.label,
            confidence: parsed.confidence,
        })
    }
}
