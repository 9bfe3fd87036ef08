// ABOUTME: Calorie response worker: writes estimated calories onto the prediction record
// ABOUTME: Auto-ack consumption; bad messages and store failures are logged and swallowed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use super::DeliveryHandler;
use crate::constants::{queues, service_names};
use crate::database::CalorieRecordStore;
use crate::errors::AppResult;
use crate::logging::AppLogger;
use crate::messaging::{AckMode, BrokerConnection, DeliveryStream, InboundMessage};

/// What happened to one response message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Record updated
    Updated {
        /// Record id
        doc_id: String,
        /// Value written
        calories: i64,
    },
    /// `doc_id` or `calories` missing or falsy
    Dropped,
    /// Body undecodable or store update failed
    Failed,
}

/// Consumes `calorie_response` and updates the record store
///
/// Messages are auto-acknowledged at delivery, so every failure here loses the
/// update.
pub struct ResponseWorker<S: CalorieRecordStore> {
    store: S,
    response_queue: String,
}

impl<S: CalorieRecordStore> ResponseWorker<S> {
    /// Worker writing to `store`
    pub fn new(store: S) -> Self {
        Self {
            store,
            response_queue: queues::CALORIE_RESPONSE.to_owned(),
        }
    }

    /// Apply one response body
    pub async fn process(&self, body: &[u8]) -> ResponseOutcome {
        let data: Value = match serde_json::from_slice(body) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, body = %String::from_utf8_lossy(body), "Failed to decode JSON message");
                return ResponseOutcome::Failed;
            }
        };

        let Some((doc_id, calories)) = truthy_update(&data) else {
            warn!(data = %data, "Received invalid data format");
            AppLogger::log_pipeline_event("response", None, "dropped");
            return ResponseOutcome::Dropped;
        };

        info!(doc_id = %doc_id, calories, "Received update for {doc_id}: {calories} kcal");
        match self.store.set_calories(doc_id, calories).await {
            Ok(()) => {
                AppLogger::log_pipeline_event("response", Some(doc_id), "updated");
                ResponseOutcome::Updated {
                    doc_id: doc_id.to_owned(),
                    calories,
                }
            }
            Err(e) => {
                error!(doc_id = %doc_id, error = %e, "Error processing message");
                ResponseOutcome::Failed
            }
        }
    }
}

/// `doc_id` must be a non-empty string and `calories` a non-zero integer.
/// A zero-calorie estimate is therefore never written.
fn truthy_update(data: &Value) -> Option<(&str, i64)> {
    let doc_id = data.get("doc_id")?.as_str().filter(|id| !id.is_empty())?;
    let calories = data.get("calories")?.as_i64().filter(|c| *c != 0)?;
    Some((doc_id, calories))
}

#[async_trait]
impl<S, C> DeliveryHandler<C> for ResponseWorker<S>
where
    S: CalorieRecordStore,
    C: BrokerConnection,
{
    fn name(&self) -> &'static str {
        service_names::CALORIE_LISTENER
    }

    async fn subscribe(&self, connection: &C) -> AppResult<DeliveryStream> {
        connection.declare_durable_queue(&self.response_queue).await?;
        connection.consume(&self.response_queue, AckMode::Auto).await
    }

    async fn handle(&self, _connection: &C, message: InboundMessage) {
        self.process(&message.body).await;
    }
}
