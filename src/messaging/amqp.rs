// ABOUTME: RabbitMQ implementation of the broker traits using lapin
// ABOUTME: One connection with one channel per BrokerConnection; deliveries map to InboundMessage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, info};

use super::{
    AckMode, Acknowledger, AutoAcknowledged, BrokerConnection, BrokerConnector, DeliveryStream,
    InboundMessage, MessagePublisher,
};
use crate::config::BrokerConfig;
use crate::constants::{broker, queues};
use crate::errors::{AppError, AppResult};

/// Opens `RabbitMQ` connections from a [`BrokerConfig`]
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
    redacted_uri: String,
}

impl AmqpConnector {
    /// Connector for the configured broker
    #[must_use]
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            uri: config.amqp_uri(),
            redacted_uri: config.redacted_uri(),
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Connection = AmqpConnection;

    async fn connect(&self) -> AppResult<AmqpConnection> {
        debug!(broker = %self.redacted_uri, "Connecting to RabbitMQ");
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| {
                AppError::broker(format!("Failed to connect to RabbitMQ: {e}")).with_source(e)
            })?;

        let channel = connection.create_channel().await.map_err(|e| {
            AppError::broker(format!("Failed to create channel: {e}")).with_source(e)
        })?;

        info!(broker = %self.redacted_uri, "Connected to RabbitMQ");
        Ok(AmqpConnection {
            connection,
            channel,
        })
    }
}

/// Open `RabbitMQ` connection with one channel
pub struct AmqpConnection {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl MessagePublisher for AmqpConnection {
    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> AppResult<()> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(queues::PERSISTENT_DELIVERY_MODE),
            )
            .await
            .map_err(|e| {
                AppError::broker(format!("Failed to publish to {queue}: {e}")).with_source(e)
            })?
            .await
            .map_err(|e| {
                AppError::broker(format!("Publish to {queue} not confirmed: {e}")).with_source(e)
            })?;

        debug!(queue = %queue, bytes = payload.len(), "Published persistent message");
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn declare_durable_queue(&self, queue: &str) -> AppResult<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                AppError::broker(format!("Failed to declare queue {queue}: {e}")).with_source(e)
            })?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> AppResult<()> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(AppError::from)
    }

    async fn consume(&self, queue: &str, mode: AckMode) -> AppResult<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: mode == AckMode::Auto,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                AppError::broker(format!("Failed to consume {queue}: {e}")).with_source(e)
            })?;

        info!(queue = %queue, ?mode, "Waiting for messages");

        let deliveries = consumer.map(move |delivery| {
            let delivery = delivery.map_err(AppError::from)?;
            let acker: Box<dyn Acknowledger> = match mode {
                AckMode::Manual => Box::new(AmqpAcknowledger {
                    acker: delivery.acker,
                }),
                AckMode::Auto => Box::new(AutoAcknowledged),
            };
            Ok(InboundMessage::new(delivery.data, acker))
        });
        let stream: DeliveryStream = Box::pin(deliveries);
        Ok(stream)
    }

    async fn close(&self) -> AppResult<()> {
        self.connection
            .close(broker::CLOSE_REPLY_SUCCESS, "Bye")
            .await
            .map_err(|e| {
                AppError::broker(format!("Failed to close RabbitMQ connection: {e}")).with_source(e)
            })?;
        info!("RabbitMQ connection closed");
        Ok(())
    }
}

/// Manual-ack handle of one delivery
struct AmqpAcknowledger {
    acker: Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcknowledger {
    async fn ack(&self) -> AppResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(AppError::from)
    }

    async fn reject(&self) -> AppResult<()> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
            .map_err(AppError::from)
    }
}
