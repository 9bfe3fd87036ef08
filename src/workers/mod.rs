// ABOUTME: Shared consume loop for the calorie workers with policy-driven reconnection
// ABOUTME: CONNECTING -> CONSUMING -> per-message handling, re-entering CONNECTING on connection loss
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Calorie Workers
//!
//! Both workers run the same outer loop:
//!
//! 1. connect according to a [`ReconnectPolicy`];
//! 2. let the handler declare its queues and start consuming;
//! 3. hand deliveries to the handler one at a time;
//! 4. on connection loss close, wait the policy delay and go back to 1.
//!
//! The loop ends cleanly when the shutdown signal flips, and fails only when a
//! bounded policy runs out of connection attempts.

/// `calorie_request` consumer
pub mod request_worker;
/// `calorie_response` consumer
pub mod response_worker;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ReconnectPolicy;
use crate::errors::{AppError, AppResult};
use crate::messaging::{BrokerConnection, BrokerConnector, DeliveryStream, InboundMessage};

pub use request_worker::{RequestOutcome, RequestWorker};
pub use response_worker::{ResponseOutcome, ResponseWorker};

/// Worker-specific part of the consume loop
#[async_trait]
pub trait DeliveryHandler<C: BrokerConnection>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Declare queues, set QoS and start consuming on a fresh connection
    async fn subscribe(&self, connection: &C) -> AppResult<DeliveryStream>;

    /// Process one delivery; errors are settled and logged inside
    async fn handle(&self, connection: &C, message: InboundMessage);
}

/// Why a consuming session ended
enum SessionEnd {
    Shutdown,
    Lost(AppError),
}

/// Run `handler` until shutdown
///
/// # Errors
///
/// Returns a broker error when a bounded policy exhausts its attempts
pub async fn run_consumer<K, H>(
    connector: &K,
    policy: ReconnectPolicy,
    handler: &H,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<()>
where
    K: BrokerConnector,
    H: DeliveryHandler<K::Connection>,
{
    loop {
        let Some(connection) = connect_with_policy(connector, policy, &mut shutdown).await? else {
            info!(worker = handler.name(), "Shutdown requested before connecting");
            return Ok(());
        };

        let end = consume_session(&connection, handler, &mut shutdown).await;

        if let Err(e) = connection.close().await {
            warn!(worker = handler.name(), error = %e, "Failed to close connection");
        }

        match end {
            SessionEnd::Shutdown => {
                info!(worker = handler.name(), "Consumer stopped");
                return Ok(());
            }
            SessionEnd::Lost(e) => {
                error!(
                    worker = handler.name(),
                    error = %e,
                    "Connection lost, retrying in {}s",
                    policy.delay().as_secs()
                );
                if sleep_or_shutdown(policy, &mut shutdown).await {
                    return Ok(());
                }
            }
        }
    }
}

async fn consume_session<C, H>(
    connection: &C,
    handler: &H,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    C: BrokerConnection,
    H: DeliveryHandler<C>,
{
    let mut deliveries = match handler.subscribe(connection).await {
        Ok(stream) => stream,
        Err(e) => return SessionEnd::Lost(e),
    };

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return SessionEnd::Shutdown;
                }
            }
            next = deliveries.next() => match next {
                Some(Ok(message)) => handler.handle(connection, message).await,
                Some(Err(e)) => return SessionEnd::Lost(e),
                None => return SessionEnd::Lost(AppError::broker("Consumer stream ended")),
            },
        }
    }
}

/// Connect following `policy`
///
/// Returns `Ok(None)` when shutdown is requested while waiting.
///
/// # Errors
///
/// Returns a broker error after `max_attempts` consecutive failures of a bounded policy
pub async fn connect_with_policy<K: BrokerConnector>(
    connector: &K,
    policy: ReconnectPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> AppResult<Option<K::Connection>> {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return Ok(None);
        }
        attempt += 1;
        match policy.max_attempts() {
            Some(max) => info!("Connecting to RabbitMQ (attempt {attempt}/{max})"),
            None => info!("Connecting to RabbitMQ (attempt {attempt})"),
        }

        match connector.connect().await {
            Ok(connection) => return Ok(Some(connection)),
            Err(e) => {
                warn!(attempt, error = %e, "Connection attempt failed");
                if policy.max_attempts().is_some_and(|max| attempt >= max) {
                    error!("Max retries reached. Could not connect to RabbitMQ");
                    return Err(AppError::broker(format!(
                        "Max retries reached after {attempt} connection attempts"
                    ))
                    .with_source(e));
                }
                info!("Retrying in {} seconds...", policy.delay().as_secs());
                if sleep_or_shutdown(policy, shutdown).await {
                    return Ok(None);
                }
            }
        }
    }
}

/// Wait the policy delay; `true` if shutdown was requested meanwhile
async fn sleep_or_shutdown(policy: ReconnectPolicy, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(policy.delay()) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
