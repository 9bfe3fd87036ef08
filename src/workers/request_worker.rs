// ABOUTME: Calorie request worker: estimate calories for each request and publish the response
// ABOUTME: Manual ack after the response is published, nack without requeue on any failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::DeliveryHandler;
use crate::constants::{queues, service_names};
use crate::errors::{AppError, AppResult};
use crate::inference::CalorieEstimator;
use crate::logging::AppLogger;
use crate::messaging::{
    AckMode, BrokerConnection, CalorieRequest, CalorieResponse, DeliveryStream, InboundMessage,
    MessagePublisher,
};

/// How a request delivery was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Response published, request acknowledged
    Acknowledged(CalorieResponse),
    /// Processing failed, request dropped without requeue
    Rejected,
}

/// Consumes `calorie_request`, publishes to `calorie_response`
pub struct RequestWorker<E: CalorieEstimator> {
    estimator: E,
    request_queue: String,
    response_queue: String,
}

impl<E: CalorieEstimator> RequestWorker<E> {
    /// Worker on the standard queues
    pub fn new(estimator: E) -> Self {
        Self {
            estimator,
            request_queue: queues::CALORIE_REQUEST.to_owned(),
            response_queue: queues::CALORIE_RESPONSE.to_owned(),
        }
    }

    /// Estimate, publish, then settle one delivery
    pub async fn process(
        &self,
        publisher: &dyn MessagePublisher,
        message: &InboundMessage,
    ) -> RequestOutcome {
        match self.respond(publisher, &message.body).await {
            Ok(response) => {
                if let Err(e) = message.ack().await {
                    warn!(error = %e, "Failed to acknowledge calorie request");
                }
                AppLogger::log_pipeline_event("request", response.doc_id.as_deref(), "acknowledged");
                RequestOutcome::Acknowledged(response)
            }
            Err(e) => {
                error!(
                    error = %e,
                    body = %String::from_utf8_lossy(&message.body),
                    "Error processing calorie request, dropping without requeue"
                );
                if let Err(nack_error) = message.reject().await {
                    warn!(error = %nack_error, "Failed to reject calorie request");
                }
                RequestOutcome::Rejected
            }
        }
    }

    async fn respond(
        &self,
        publisher: &dyn MessagePublisher,
        body: &[u8],
    ) -> AppResult<CalorieResponse> {
        let request = CalorieRequest::from_slice(body)?;
        info!(
            doc_id = request.doc_id.as_deref().unwrap_or("(none)"),
            food_name = request.food_name.as_deref().unwrap_or("(none)"),
            "Processing calorie request"
        );

        let food_name = request
            .food_name
            .as_deref()
            .ok_or_else(|| AppError::missing_field("food_name"))?;
        let calories = self.estimator.estimate(food_name).await?;

        let response = CalorieResponse {
            doc_id: request.doc_id,
            calories,
        };
        publisher
            .publish_persistent(&self.response_queue, &response.to_vec()?)
            .await?;
        info!(
            doc_id = response.doc_id.as_deref().unwrap_or("(none)"),
            calories = response.calories,
            "Sent calorie response"
        );
        Ok(response)
    }
}

#[async_trait]
impl<E, C> DeliveryHandler<C> for RequestWorker<E>
where
    E: CalorieEstimator,
    C: BrokerConnection,
{
    fn name(&self) -> &'static str {
        service_names::CALORIE_WORKER
    }

    async fn subscribe(&self, connection: &C) -> AppResult<DeliveryStream> {
        connection.declare_durable_queue(&self.request_queue).await?;
        connection.declare_durable_queue(&self.response_queue).await?;
        connection
            .set_prefetch(queues::REQUEST_WORKER_PREFETCH)
            .await?;
        connection.consume(&self.request_queue, AckMode::Manual).await
    }

    async fn handle(&self, connection: &C, message: InboundMessage) {
        self.process(connection, &message).await;
    }
}
