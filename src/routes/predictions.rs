// ABOUTME: Prediction routes: image upload and classification, listing, editing and deletion
// ABOUTME: Each saved prediction is queued for asynchronous calorie estimation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Prediction routes
//!
//! All endpoints require a Firebase bearer token. Records belonging to another
//! user are indistinguishable from missing ones: both answer 403.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{authenticate, AuthenticatedUser};
use crate::classifier::FoodPrediction;
use crate::constants::uploads::FILES_FIELD;
use crate::database::{NewPrediction, PredictionRecord, PredictionUpdate};
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::messaging::CalorieRequest;
use crate::resources::ServerResources;
use crate::security::UploadedImage;

/// One classified upload in the `POST /predict` response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResult {
    /// Saved record id
    pub id: String,
    /// Classifier output
    pub prediction: FoodPrediction,
    /// Filename as uploaded
    pub filename: String,
}

/// Response of `POST /predict`
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    /// One entry per uploaded file, in upload order
    pub results: Vec<PredictResult>,
}

/// Response of `GET /predictions`
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionsResponse {
    /// The caller's records
    pub predictions: Vec<PredictionRecord>,
}

/// Prediction routes implementation
pub struct PredictionRoutes;

impl PredictionRoutes {
    /// Create all prediction routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/predict", post(Self::handle_predict))
            .route("/predictions", get(Self::handle_list))
            .route(
                "/predictions/:doc_id",
                put(Self::handle_update).delete(Self::handle_delete),
            )
            .with_state(resources)
    }

    /// Record `doc_id` if it exists and belongs to `user`
    async fn owned_prediction(
        resources: &ServerResources,
        user: &AuthenticatedUser,
        doc_id: &str,
    ) -> AppResult<PredictionRecord> {
        match resources.database.get_prediction(doc_id).await? {
            Some(record) if record.user_id == user.uid => Ok(record),
            _ => {
                AppLogger::log_security_event(
                    "prediction_access_denied",
                    "medium",
                    doc_id,
                    Some(&user.uid),
                );
                Err(AppError::permission_denied("Unauthorized").with_resource_id(doc_id))
            }
        }
    }

    /// Handle POST /predict
    async fn handle_predict(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> Result<Response, AppError> {
        let user = authenticate(&headers, resources.verifier.as_ref()).await?;
        // Only uploads are recorded in the interaction log
        resources
            .database
            .log_request(&user.uid, "/predict", "POST")
            .await?;

        let images = read_images(&mut multipart).await?;
        if images.is_empty() {
            return Err(AppError::missing_field(FILES_FIELD));
        }

        let mut results = Vec::with_capacity(images.len());
        for image in images {
            results.push(Self::predict_one(&resources, &user, image).await?);
        }

        info!(user_id = %user.uid, count = results.len(), "Predictions saved and queued");
        Ok((StatusCode::OK, Json(PredictResponse { results })).into_response())
    }

    /// Validate, classify, save, log and queue one image
    async fn predict_one(
        resources: &ServerResources,
        user: &AuthenticatedUser,
        image: UploadedImage,
    ) -> AppResult<PredictResult> {
        resources.validator.validate(&image)?;
        let stored_name = resources.validator.rename_image(&image);

        let content_type = image.content_type.as_deref().unwrap_or_default();
        let prediction = resources
            .classifier
            .classify(&image.bytes, content_type)
            .await?;

        let doc_id = resources
            .database
            .create_prediction(&NewPrediction {
                user_id: user.uid.clone(),
                filename: image.filename.clone(),
                prediction: prediction.food.clone(),
                confidence: prediction.confidence,
            })
            .await?;

        resources
            .database
            .log_upload(&user.uid, &stored_name, prediction.confidence)
            .await?;

        resources
            .publisher
            .publish(&CalorieRequest::new(doc_id.as_str(), prediction.food.as_str()))
            .await
            .map_err(|e| {
                AppError::internal(format!("Failed to queue calorie estimation: {}", e.message))
                    .with_resource_id(doc_id.as_str())
                    .with_source(e)
            })?;
        AppLogger::log_pipeline_event("publish", Some(&doc_id), "queued");

        Ok(PredictResult {
            id: doc_id,
            prediction,
            filename: image.filename,
        })
    }

    /// Handle GET /predictions
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let user = authenticate(&headers, resources.verifier.as_ref()).await?;
        let predictions = resources.database.list_predictions_for_user(&user.uid).await?;
        Ok((StatusCode::OK, Json(PredictionsResponse { predictions })).into_response())
    }

    /// Handle PUT /predictions/:doc_id
    async fn handle_update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(doc_id): Path<String>,
        body: Result<Json<PredictionUpdate>, JsonRejection>,
    ) -> Result<Response, AppError> {
        let user = authenticate(&headers, resources.verifier.as_ref()).await?;
        Self::owned_prediction(&resources, &user, &doc_id).await?;

        let Json(update) =
            body.map_err(|e| AppError::invalid_input(format!("Invalid update: {}", e.body_text())))?;
        resources.database.update_prediction(&doc_id, &update).await?;

        info!(user_id = %user.uid, doc_id = %doc_id, "Prediction updated");
        Ok((StatusCode::OK, Json(json!({ "status": "updated" }))).into_response())
    }

    /// Handle DELETE /predictions/:doc_id
    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(doc_id): Path<String>,
    ) -> Result<Response, AppError> {
        let user = authenticate(&headers, resources.verifier.as_ref()).await?;
        Self::owned_prediction(&resources, &user, &doc_id).await?;

        if !resources.database.delete_prediction(&doc_id).await? {
            warn!(doc_id = %doc_id, "Prediction vanished before delete");
        }

        info!(user_id = %user.uid, doc_id = %doc_id, "Prediction deleted");
        Ok((StatusCode::OK, Json(json!({ "status": "deleted" }))).into_response())
    }
}

/// Collect every `files` part of the multipart body
async fn read_images(multipart: &mut Multipart) -> AppResult<Vec<UploadedImage>> {
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_owned();
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        images.push(UploadedImage {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Ok(images)
}

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large("Payload Too Large.")
    } else {
        AppError::invalid_input(format!("Invalid multipart body: {}", error.body_text()))
    }
}
