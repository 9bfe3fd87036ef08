// ABOUTME: SQLite store for prediction records and the per-user request log
// ABOUTME: Owns the connection pool, runs migrations and implements the calorie record seam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Database
//!
//! One [`Database`] value is constructed at startup and passed to whoever needs
//! it; cloning shares the pool.

/// Upload and API request log
pub mod interactions;
/// Prediction records
pub mod predictions;

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::config::{DatabaseConfig, DatabaseUrl};
use crate::errors::{AppError, AppResult};

pub use interactions::{ApiRequestRecord, UploadRecord};
pub use predictions::{NewPrediction, PredictionRecord, PredictionUpdate};

/// Partial update of a persisted record, keyed by its opaque id
#[async_trait]
pub trait CalorieRecordStore: Send + Sync {
    /// Set the `calories` field of record `doc_id`
    async fn set_calories(&self, doc_id: &str, calories: i64) -> AppResult<()>;
}

/// Database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the connection
    /// fails or a migration fails
    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = match &config.url {
            DatabaseUrl::Memory => {
                // A single connection that never expires keeps the in-memory database alive
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect("sqlite::memory:")
                    .await?
            }
            DatabaseUrl::SQLite { path } => {
                ensure_parent_dir(path).await?;
                // Ensure SQLite creates the database file if it doesn't exist
                let connection_options = format!("{}?mode=rwc", config.url.to_connection_string());
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections.max(1))
                    .connect(&connection_options)
                    .await?
            }
        };

        let db = Self { pool };
        db.migrate().await?;
        info!(database = %config.url, "Database ready");
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_predictions().await?;
        self.migrate_interactions().await?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// Cheap connectivity probe for readiness checks
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not answer
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn ensure_parent_dir(path: &Path) -> AppResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::database(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
                .with_source(e)
            })
        }
        _ => Ok(()),
    }
}
