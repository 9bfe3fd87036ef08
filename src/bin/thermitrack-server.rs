// ABOUTME: HTTP API server binary for food image recognition
// ABOUTME: Wires Firebase auth, the classifier client, SQLite and the calorie request publisher into axum
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Thermitrack API Server Binary
//!
//! Serves the prediction API and queues a calorie request for every saved
//! prediction.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use thermitrack::{
    auth::FirebaseAuth,
    classifier::HttpFoodClassifier,
    config::ServerConfig,
    constants::service_names,
    database::Database,
    logging,
    messaging::{amqp::AmqpConnector, CalorieRequestPublisher},
    rate_limiting::RateLimiter,
    resources::ServerResources,
    routes,
    security::ImageValidator,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "thermitrack-server")]
#[command(about = "Thermitrack - food image recognition API with calorie estimation")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env(service_names::THERMITRACK_SERVER)?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    info!("Starting Thermitrack API server");
    info!("{}", config.summary());

    let database = Database::new(&config.database).await?;

    let firebase = FirebaseAuth::new(config.firebase.clone());
    if !firebase.is_enabled() {
        warn!("Firebase is not configured; every authenticated request will be rejected");
    }

    let classifier = HttpFoodClassifier::new(&config.classifier)?;
    let publisher = CalorieRequestPublisher::new(
        AmqpConnector::new(&config.broker),
        config.broker.request_queue.clone(),
    );

    let resources = Arc::new(ServerResources::new(
        database,
        Arc::new(firebase),
        Arc::new(classifier),
        Arc::new(publisher),
        ImageValidator::new(config.uploads.clone()),
        RateLimiter::new(config.rate_limit.clone()),
    ));

    let app = routes::router(resources).layer(routes::setup_cors(&config.cors_allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
