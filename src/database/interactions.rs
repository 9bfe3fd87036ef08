// ABOUTME: Per-user activity log: image uploads and authenticated API requests
// ABOUTME: Backs GET /interactions with the caller's request history, newest first
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::Database;
use crate::errors::AppResult;

/// One logged upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Row id
    pub id: i64,
    /// Uploader
    pub user_id: String,
    /// Generated storage name of the image
    pub filename: String,
    /// Classifier confidence
    pub confidence: f64,
    /// Upload time
    pub upload_time: DateTime<Utc>,
}

/// One logged API request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequestRecord {
    /// Row id
    pub id: i64,
    /// Caller
    pub user_id: String,
    /// Route path
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// Request time
    pub timestamp: DateTime<Utc>,
}

impl Database {
    pub(super) async fn migrate_interactions(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                confidence REAL NOT NULL,
                upload_time DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS api_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                method TEXT NOT NULL,
                timestamp DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_requests_user_id ON api_requests(user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record an image upload
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails
    pub async fn log_upload(&self, user_id: &str, filename: &str, confidence: f64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO uploads (user_id, filename, confidence, upload_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(filename)
        .bind(confidence)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record an authenticated API request
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails
    pub async fn log_request(&self, user_id: &str, endpoint: &str, method: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO api_requests (user_id, endpoint, method, timestamp) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(method)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Uploads of `user_id`, newest first
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails
    pub async fn get_uploads_for_user(&self, user_id: &str) -> AppResult<Vec<UploadRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, filename, confidence, upload_time
            FROM uploads WHERE user_id = $1
            ORDER BY upload_time DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UploadRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                filename: row.get("filename"),
                confidence: row.get("confidence"),
                upload_time: row.get("upload_time"),
            })
            .collect())
    }

    /// API requests of `user_id`, newest first
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails
    pub async fn get_interactions_for_user(&self, user_id: &str) -> AppResult<Vec<ApiRequestRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, endpoint, method, timestamp
            FROM api_requests WHERE user_id = $1
            ORDER BY timestamp DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ApiRequestRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                endpoint: row.get("endpoint"),
                method: row.get("method"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}
