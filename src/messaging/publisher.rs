// ABOUTME: Publishes one calorie request per classified image on a fresh broker connection
// ABOUTME: The connection is closed on every path once opened; failures propagate to the HTTP handler
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{BrokerConnection, BrokerConnector, CalorieRequest, MessagePublisher};
use crate::errors::AppResult;

/// Destination for calorie requests, as seen by the HTTP layer
#[async_trait]
pub trait CalorieRequestQueue: Send + Sync {
    /// Publish one request
    async fn publish(&self, request: &CalorieRequest) -> AppResult<()>;
}

/// Connection-per-call publisher
///
/// No pooling and no local retry: a failure is logged and returned so the
/// enclosing request fails.
pub struct CalorieRequestPublisher<K: BrokerConnector> {
    connector: K,
    queue: String,
}

impl<K: BrokerConnector> CalorieRequestPublisher<K> {
    /// Publisher sending to `queue`
    pub fn new(connector: K, queue: impl Into<String>) -> Self {
        Self {
            connector,
            queue: queue.into(),
        }
    }

    /// Destination queue name
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn declare_and_publish(&self, connection: &K::Connection, payload: &[u8]) -> AppResult<()> {
        connection.declare_durable_queue(&self.queue).await?;
        connection.publish_persistent(&self.queue, payload).await
    }
}

#[async_trait]
impl<K: BrokerConnector> CalorieRequestQueue for CalorieRequestPublisher<K> {
    async fn publish(&self, request: &CalorieRequest) -> AppResult<()> {
        let payload = request.to_vec()?;

        let connection = self.connector.connect().await.inspect_err(|e| {
            error!(queue = %self.queue, error = %e, "Failed to connect for calorie request publish");
        })?;

        let published = self.declare_and_publish(&connection, &payload).await;
        let closed = connection.close().await;

        match (published, closed) {
            (Ok(()), Ok(())) => {
                info!(
                    queue = %self.queue,
                    doc_id = request.doc_id.as_deref().unwrap_or("(none)"),
                    "Published calorie request"
                );
                Ok(())
            }
            (Ok(()), Err(close_error)) => {
                error!(queue = %self.queue, error = %close_error, "Failed to close publisher connection");
                Err(close_error)
            }
            (Err(publish_error), closed) => {
                if let Err(close_error) = closed {
                    warn!(error = %close_error, "Failed to close publisher connection after publish error");
                }
                error!(queue = %self.queue, error = %publish_error, "Failed to publish calorie request");
                Err(publish_error)
            }
        }
    }
}
