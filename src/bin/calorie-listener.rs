// ABOUTME: Response worker binary: consumes calorie_response and stores calories on prediction records
// ABOUTME: Reconnects forever by default; stops cleanly on Ctrl-C
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use anyhow::Result;
use thermitrack::{
    config::{BrokerConfig, DatabaseConfig, WorkerConfig},
    constants::service_names,
    database::Database,
    logging,
    messaging::amqp::AmqpConnector,
    workers::{run_consumer, ResponseWorker},
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env(service_names::CALORIE_LISTENER)?;

    let broker = BrokerConfig::from_env()?;
    let worker = WorkerConfig::response_worker_from_env()?;
    let database = Database::new(&DatabaseConfig::from_env()?).await?;

    info!(
        broker = %broker.redacted_uri(),
        reconnect = ?worker.reconnect,
        "Starting calorie listener"
    );

    let connector = AmqpConnector::new(&broker);
    let handler = ResponseWorker::new(database);

    let (tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = tx.send(true);
    });

    if let Err(e) = run_consumer(&connector, worker.reconnect, &handler, shutdown).await {
        error!(error = %e, "Calorie listener stopped");
        return Err(e.into());
    }

    info!("Calorie listener exited");
    Ok(())
}
