// ABOUTME: Request worker binary: consumes calorie_request, runs BitNet inference, publishes calorie_response
// ABOUTME: Gives up with a non-zero exit once the bounded reconnect policy is exhausted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use anyhow::Result;
use clap::Parser;
use thermitrack::{
    config::{BrokerConfig, InferenceConfig, WorkerConfig},
    constants::service_names,
    inference::BitNetEstimator,
    logging,
    messaging::amqp::AmqpConnector,
    workers::{run_consumer, RequestWorker},
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "calorie-worker")]
#[command(about = "Estimates calories for queued food labels with the BitNet model")]
pub struct Args {
    /// Override the model file
    #[arg(long)]
    model_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env(service_names::CALORIE_WORKER)?;

    let broker = BrokerConfig::from_env()?;
    let worker = WorkerConfig::request_worker_from_env()?;
    let mut inference = InferenceConfig::from_env()?;
    if let Some(model_path) = args.model_path {
        inference.model_path = model_path;
    }

    info!(
        broker = %broker.redacted_uri(),
        model = %inference.model_path,
        reconnect = ?worker.reconnect,
        "Starting calorie worker"
    );

    let connector = AmqpConnector::new(&broker);
    let handler = RequestWorker::new(BitNetEstimator::new(inference));
    let shutdown = spawn_shutdown_listener();

    if let Err(e) = run_consumer(&connector, worker.reconnect, &handler, shutdown).await {
        error!(error = %e, "Calorie worker stopped");
        return Err(e.into());
    }

    info!("Calorie worker exited");
    Ok(())
}

/// Flip the returned receiver to `true` on Ctrl-C
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        // Receivers may already be gone when the consumer failed first
        let _ = tx.send(true);
    });
    rx
}
