// ABOUTME: Calorie queue messages and the broker abstraction shared by the publisher and both workers
// ABOUTME: Workers and the publisher depend on these traits; the RabbitMQ adapter lives in amqp.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Messaging
//!
//! Wire types for the `calorie_request` and `calorie_response` queues and the
//! narrow broker surface the pipeline needs: connect, declare a durable queue,
//! set prefetch, publish a persistent message, consume, close.
//!
//! Connections are explicit values with a `connect` and a `close`; nothing in
//! this module holds a process-wide client.

/// `RabbitMQ` implementation over `lapin`
pub mod amqp;
/// Request publisher used by the HTTP layer
pub mod publisher;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult, ErrorCode};

pub use publisher::{CalorieRequestPublisher, CalorieRequestQueue};

/// Message on `calorie_request`
///
/// Both fields are optional on the consuming side: a missing or non-string
/// field degrades to `None` instead of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalorieRequest {
    /// Prediction record to update once calories are known
    pub doc_id: Option<String>,
    /// Food label produced by the classifier
    pub food_name: Option<String>,
}

impl CalorieRequest {
    /// Request for a freshly saved prediction
    pub fn new(doc_id: impl Into<String>, food_name: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            food_name: Some(food_name.into()),
        }
    }

    /// Lenient parse of a queue body
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` when the body is not JSON and
    /// `InvalidFormat` when it is JSON but not an object
    pub fn from_slice(body: &[u8]) -> AppResult<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(fields) = value else {
            return Err(AppError::new(
                ErrorCode::InvalidFormat,
                "Calorie request body is not a JSON object",
            ));
        };
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            doc_id: text("doc_id"),
            food_name: text("food_name"),
        })
    }

    /// Serialize for publishing
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails
    pub fn to_vec(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Message on `calorie_response`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalorieResponse {
    /// Copied from the request, `None` if the request had none
    pub doc_id: Option<String>,
    /// Estimated calories
    pub calories: i64,
}

impl CalorieResponse {
    /// Serialize for publishing
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails
    pub fn to_vec(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Publishes persistent messages to a named queue on the default exchange
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` to `queue` with persistent delivery mode
    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> AppResult<()>;
}

/// Settles one delivered message
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positive acknowledgment
    async fn ack(&self) -> AppResult<()>;
    /// Negative acknowledgment without requeue; the broker drops the message
    async fn reject(&self) -> AppResult<()>;
}

/// Acknowledger for deliveries consumed in auto-ack mode
pub struct AutoAcknowledged;

#[async_trait]
impl Acknowledger for AutoAcknowledged {
    async fn ack(&self) -> AppResult<()> {
        Ok(())
    }

    async fn reject(&self) -> AppResult<()> {
        Ok(())
    }
}

/// One delivery from a consumed queue
pub struct InboundMessage {
    /// Raw message body
    pub body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    /// Wrap a body and the handle that settles it
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    /// Acknowledge the delivery
    ///
    /// # Errors
    ///
    /// Returns a broker error if the channel is gone
    pub async fn ack(&self) -> AppResult<()> {
        self.acker.ack().await
    }

    /// Negatively acknowledge without requeue
    ///
    /// # Errors
    ///
    /// Returns a broker error if the channel is gone
    pub async fn reject(&self) -> AppResult<()> {
        self.acker.reject().await
    }
}

/// Deliveries of one consumer; an `Err` item or the end of the stream means the
/// connection is lost
pub type DeliveryStream = Pin<Box<dyn Stream<Item = AppResult<InboundMessage>> + Send>>;

/// How deliveries are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// The consumer settles each delivery with ack or reject
    Manual,
    /// The broker considers a message consumed as soon as it is delivered
    Auto,
}

/// An open broker connection with one channel
#[async_trait]
pub trait BrokerConnection: MessagePublisher {
    /// Declare `queue` durable (idempotent)
    async fn declare_durable_queue(&self, queue: &str) -> AppResult<()>;

    /// Limit unacknowledged deliveries held by this channel
    async fn set_prefetch(&self, count: u16) -> AppResult<()>;

    /// Start consuming `queue`
    async fn consume(&self, queue: &str, mode: AckMode) -> AppResult<DeliveryStream>;

    /// Close the connection
    async fn close(&self) -> AppResult<()>;
}

/// Opens broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connection type produced
    type Connection: BrokerConnection + 'static;

    /// Open a new connection
    async fn connect(&self) -> AppResult<Self::Connection>;
}
