// ABOUTME: Test application wiring the real router to an in-memory database and fake collaborators
// ABOUTME: Rate limiting is off unless a test asks for it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thermitrack::config::{DatabaseConfig, RateLimitConfig, UploadConfig};
use thermitrack::database::Database;
use thermitrack::rate_limiting::RateLimiter;
use thermitrack::resources::ServerResources;
use thermitrack::routes;
use thermitrack::security::ImageValidator;

use super::fakes::{FakeClassifier, FakeVerifier, RecordingQueue};

/// Router plus handles on its collaborators
pub struct TestApp {
    router: Router,
    pub database: Database,
    pub classifier: Arc<FakeClassifier>,
    pub queue: Arc<RecordingQueue>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            uploads: UploadConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            queue: RecordingQueue::default(),
        }
    }

    /// Fresh handle on the router for one request
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

pub struct TestAppBuilder {
    uploads: UploadConfig,
    rate_limit: RateLimitConfig,
    queue: RecordingQueue,
}

impl TestAppBuilder {
    pub const fn max_file_bytes(mut self, bytes: usize) -> Self {
        self.uploads.max_file_bytes = bytes;
        self
    }

    pub fn rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limit = RateLimitConfig {
            enabled: true,
            requests_per_window: requests_per_minute,
            window: Duration::from_secs(60),
        };
        self
    }

    pub fn failing_queue(mut self) -> Self {
        self.queue = RecordingQueue::failing();
        self
    }

    pub async fn build(self) -> TestApp {
        let database = Database::new(&DatabaseConfig::in_memory())
            .await
            .expect("in-memory database");
        let classifier = Arc::new(FakeClassifier::answering("pizza", 0.93));
        let queue = Arc::new(self.queue);

        let resources = Arc::new(ServerResources::new(
            database.clone(),
            Arc::new(FakeVerifier),
            classifier.clone(),
            queue.clone(),
            ImageValidator::new(self.uploads),
            RateLimiter::new(self.rate_limit),
        ));

        TestApp {
            router: routes::router(resources),
            database,
            classifier,
            queue,
        }
    }
}
