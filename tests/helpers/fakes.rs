// ABOUTME: In-memory stand-ins for the broker, inference process, token verifier, classifier and record store
// ABOUTME: Every fake records what it was asked to do so tests can assert on side effects
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use thermitrack::auth::{AuthenticatedUser, TokenVerifier};
use thermitrack::classifier::{FoodClassifier, FoodPrediction};
use thermitrack::database::CalorieRecordStore;
use thermitrack::errors::{AppError, AppResult};
use thermitrack::inference::CalorieEstimator;
use thermitrack::messaging::{
    AckMode, Acknowledger, AutoAcknowledged, BrokerConnection, BrokerConnector, CalorieRequest,
    CalorieRequestQueue, DeliveryStream, InboundMessage, MessagePublisher,
};

// ============================================================================
// Broker
// ============================================================================

/// What one consumer session delivers
pub enum Session {
    /// These bodies, then nothing more until shutdown
    Deliver(Vec<Vec<u8>>),
    /// The connection drops right after consuming starts
    Drop,
}

/// Everything the fake broker observed
#[derive(Debug, Default)]
pub struct BrokerLog {
    pub connect_attempts: usize,
    pub closes: usize,
    pub declared: Vec<String>,
    pub prefetch: Option<u16>,
    pub consumed: Vec<(String, AckMode)>,
    pub published: Vec<(String, Vec<u8>)>,
    pub acks: usize,
    pub rejects: usize,
}

/// Broker connector whose connections share one log
#[derive(Clone, Default)]
pub struct FakeBroker {
    log: Arc<Mutex<BrokerLog>>,
    failing_connects: Arc<AtomicUsize>,
    fail_publish: Arc<AtomicBool>,
    fail_close: Arc<AtomicBool>,
    sessions: Arc<Mutex<VecDeque<Session>>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connects; `usize::MAX` fails forever
    pub fn fail_connects(self, count: usize) -> Self {
        self.failing_connects.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_publish(self) -> Self {
        self.fail_publish.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_close(self) -> Self {
        self.fail_close.store(true, Ordering::SeqCst);
        self
    }

    /// Queue a consumer session script
    pub fn with_session(self, session: Session) -> Self {
        self.sessions.lock().unwrap().push_back(session);
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, BrokerLog> {
        self.log.lock().unwrap()
    }

    /// Bodies published to `queue`
    pub fn published_to(&self, queue: &str) -> Vec<Vec<u8>> {
        self.log()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Wait until `condition` holds on the log
    pub async fn wait_for(&self, condition: impl Fn(&BrokerLog) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if condition(&*self.log()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("broker condition not reached in time");
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    type Connection = FakeConnection;

    async fn connect(&self) -> AppResult<FakeConnection> {
        self.log().connect_attempts += 1;
        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(AppError::broker("Connection refused"));
        }
        Ok(FakeConnection {
            broker: self.clone(),
        })
    }
}

/// Connection handed out by [`FakeBroker`]
pub struct FakeConnection {
    broker: FakeBroker,
}

#[async_trait]
impl MessagePublisher for FakeConnection {
    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> AppResult<()> {
        if self.broker.fail_publish.load(Ordering::SeqCst) {
            return Err(AppError::broker("Channel closed"));
        }
        self.broker
            .log()
            .published
            .push((queue.to_owned(), payload.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn declare_durable_queue(&self, queue: &str) -> AppResult<()> {
        self.broker.log().declared.push(queue.to_owned());
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> AppResult<()> {
        self.broker.log().prefetch = Some(count);
        Ok(())
    }

    async fn consume(&self, queue: &str, mode: AckMode) -> AppResult<DeliveryStream> {
        self.broker.log().consumed.push((queue.to_owned(), mode));
        let session = self.broker.sessions.lock().unwrap().pop_front();

        let stream: DeliveryStream = match session {
            Some(Session::Drop) => Box::pin(stream::empty::<AppResult<InboundMessage>>()),
            Some(Session::Deliver(bodies)) => {
                let messages: Vec<AppResult<InboundMessage>> = bodies
                    .into_iter()
                    .map(|body| Ok(self.message(body, mode)))
                    .collect();
                Box::pin(stream::iter(messages).chain(stream::pending()))
            }
            None => Box::pin(stream::pending::<AppResult<InboundMessage>>()),
        };
        Ok(stream)
    }

    async fn close(&self) -> AppResult<()> {
        self.broker.log().closes += 1;
        if self.broker.fail_close.load(Ordering::SeqCst) {
            return Err(AppError::broker("Close failed"));
        }
        Ok(())
    }
}

impl FakeConnection {
    fn message(&self, body: Vec<u8>, mode: AckMode) -> InboundMessage {
        match mode {
            AckMode::Manual => InboundMessage::new(
                body,
                Box::new(FakeAcker {
                    log: self.broker.log.clone(),
                }),
            ),
            AckMode::Auto => InboundMessage::new(body, Box::new(AutoAcknowledged)),
        }
    }
}

/// Counts acks and rejects on the shared log
pub struct FakeAcker {
    log: Arc<Mutex<BrokerLog>>,
}

impl FakeAcker {
    /// Standalone acker and the log it writes to
    pub fn standalone() -> (Self, Arc<Mutex<BrokerLog>>) {
        let log = Arc::new(Mutex::new(BrokerLog::default()));
        (Self { log: log.clone() }, log)
    }
}

#[async_trait]
impl Acknowledger for FakeAcker {
    async fn ack(&self) -> AppResult<()> {
        self.log.lock().unwrap().acks += 1;
        Ok(())
    }

    async fn reject(&self) -> AppResult<()> {
        self.log.lock().unwrap().rejects += 1;
        Ok(())
    }
}

// ============================================================================
// Inference
// ============================================================================

/// Estimator answering from a script instead of a model; clones share state
#[derive(Clone)]
pub struct FakeEstimator {
    answer: Result<i64, String>,
    labels: Arc<Mutex<Vec<String>>>,
}

impl FakeEstimator {
    pub fn returning(calories: i64) -> Self {
        Self {
            answer: Ok(calories),
            labels: Arc::default(),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            answer: Err(stderr.to_owned()),
            labels: Arc::default(),
        }
    }

    /// Labels the estimator was asked about
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalorieEstimator for FakeEstimator {
    async fn estimate(&self, food_label: &str) -> AppResult<i64> {
        self.labels.lock().unwrap().push(food_label.to_owned());
        match &self.answer {
            Ok(calories) => Ok(*calories),
            Err(stderr) => Err(AppError::inference_failed(format!(
                "Inference failed: {stderr}"
            ))),
        }
    }
}

/// Poll `condition` until it holds
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Record store
// ============================================================================

/// Store remembering every calorie update; clones share state
#[derive(Clone, Default)]
pub struct RecordingStore {
    updates: Arc<Mutex<Vec<(String, i64)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn updates(&self) -> Vec<(String, i64)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalorieRecordStore for RecordingStore {
    async fn set_calories(&self, doc_id: &str, calories: i64) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::database("disk I/O error"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((doc_id.to_owned(), calories));
        Ok(())
    }
}

// ============================================================================
// HTTP collaborators
// ============================================================================

/// Accepts `user:<uid>` tokens and the literal `expired`
pub struct FakeVerifier;

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> AppResult<AuthenticatedUser> {
        if token == "expired" {
            return Err(AppError::auth_expired());
        }
        token
            .strip_prefix("user:")
            .map(|uid| AuthenticatedUser {
                uid: uid.to_owned(),
                email: Some(format!("{uid}@example.com")),
                provider: "password".to_owned(),
            })
            .ok_or_else(|| AppError::auth_invalid("Invalid token"))
    }
}

/// Classifier with a fixed answer
pub struct FakeClassifier {
    prediction: FoodPrediction,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn answering(food: &str, confidence: f64) -> Self {
        Self {
            prediction: FoodPrediction {
                food: food.to_owned(),
                confidence,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FoodClassifier for FakeClassifier {
    async fn classify(&self, _image: &[u8], _content_type: &str) -> AppResult<FoodPrediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prediction.clone())
    }
}

/// Request queue remembering published requests
#[derive(Default)]
pub struct RecordingQueue {
    requests: Mutex<Vec<CalorieRequest>>,
    fail: AtomicBool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn requests(&self) -> Vec<CalorieRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalorieRequestQueue for RecordingQueue {
    async fn publish(&self, request: &CalorieRequest) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::broker("Failed to connect to RabbitMQ"));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}
