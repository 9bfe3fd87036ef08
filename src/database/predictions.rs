// ABOUTME: Prediction record persistence: create, read, list per user, partial update, delete
// ABOUTME: Also implements the calorie update used by the response worker
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::{CalorieRecordStore, Database};
use crate::errors::{AppError, AppResult};

/// Stored classification of one uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    /// Opaque document id, also the `doc_id` on the calorie queues
    pub id: String,
    /// Owner (Firebase uid)
    pub user_id: String,
    /// Original upload filename
    pub filename: String,
    /// Food label
    pub prediction: String,
    /// Classifier confidence
    pub confidence: f64,
    /// Calories, once the pipeline has delivered them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a prediction is saved
#[derive(Debug, Clone)]
pub struct NewPrediction {
    /// Owner
    pub user_id: String,
    /// Original upload filename
    pub filename: String,
    /// Food label
    pub prediction: String,
    /// Classifier confidence
    pub confidence: f64,
}

/// Partial update accepted by `PUT /predictions/{doc_id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictionUpdate {
    /// New food label
    pub prediction: Option<String>,
    /// New filename
    pub filename: Option<String>,
    /// Manually corrected calories
    pub calories: Option<i64>,
}

impl PredictionUpdate {
    /// `true` when no field is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.prediction.is_none() && self.filename.is_none() && self.calories.is_none()
    }
}

fn row_to_prediction(row: &SqliteRow) -> PredictionRecord {
    PredictionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        filename: row.get("filename"),
        prediction: row.get("prediction"),
        confidence: row.get("confidence"),
        calories: row.get("calories"),
        created_at: row.get("created_at"),
    }
}

impl Database {
    pub(super) async fn migrate_predictions(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                prediction TEXT NOT NULL,
                confidence REAL NOT NULL,
                calories INTEGER,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_user_id ON predictions(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Save a prediction and return its generated id
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails
    pub async fn create_prediction(&self, prediction: &NewPrediction) -> AppResult<String> {
        let id = Uuid::new_v4().simple().to_string();

        sqlx::query(
            r"
            INSERT INTO predictions (id, user_id, filename, prediction, confidence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&id)
        .bind(&prediction.user_id)
        .bind(&prediction.filename)
        .bind(&prediction.prediction)
        .bind(prediction.confidence)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(doc_id = %id, user_id = %prediction.user_id, "Saved prediction");
        Ok(id)
    }

    /// Fetch one prediction
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails
    pub async fn get_prediction(&self, doc_id: &str) -> AppResult<Option<PredictionRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, filename, prediction, confidence, calories, created_at
            FROM predictions WHERE id = $1
            ",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_prediction))
    }

    /// All predictions owned by `user_id`, oldest first
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails
    pub async fn list_predictions_for_user(&self, user_id: &str) -> AppResult<Vec<PredictionRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, filename, prediction, confidence, calories, created_at
            FROM predictions WHERE user_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_prediction).collect())
    }

    /// Apply a partial update
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty update and `ResourceNotFound` when
    /// the record does not exist
    pub async fn update_prediction(&self, doc_id: &str, update: &PredictionUpdate) -> AppResult<()> {
        if update.is_empty() {
            return Err(AppError::invalid_input("No fields to update"));
        }

        let result = sqlx::query(
            r"
            UPDATE predictions
            SET prediction = COALESCE($1, prediction),
                filename = COALESCE($2, filename),
                calories = COALESCE($3, calories)
            WHERE id = $4
            ",
        )
        .bind(update.prediction.as_deref())
        .bind(update.filename.as_deref())
        .bind(update.calories)
        .bind(doc_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Prediction {doc_id}")));
        }
        Ok(())
    }

    /// Delete a prediction; `false` if it did not exist
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails
    pub async fn delete_prediction(&self, doc_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM predictions WHERE id = $1")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CalorieRecordStore for Database {
    async fn set_calories(&self, doc_id: &str, calories: i64) -> AppResult<()> {
        let result = sqlx::query("UPDATE predictions SET calories = $1 WHERE id = $2")
            .bind(calories)
            .bind(doc_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Prediction {doc_id}")).with_resource_id(doc_id));
        }
        Ok(())
    }
}
