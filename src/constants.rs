// ABOUTME: Application constants grouped by domain (queues, inference, uploads, defaults)
// ABOUTME: Single place for the names and literals shared by the HTTP API and the calorie workers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Constants module

/// Queue names shared by the publisher and both workers
pub mod queues {
    /// Requests produced by the HTTP API, consumed by the calorie worker
    pub const CALORIE_REQUEST: &str = "calorie_request";

    /// Estimates produced by the calorie worker, consumed by the listener
    pub const CALORIE_RESPONSE: &str = "calorie_response";

    /// AMQP delivery mode marking a message persistent
    pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

    /// The calorie worker holds at most one unacknowledged message
    pub const REQUEST_WORKER_PREFETCH: u16 = 1;
}

/// Calorie inference process
pub mod inference {
    /// Substring after which the inference runtime prints timing logs
    pub const LOG_NOISE_MARKER: &str = "llama_perf_";

    /// Default interpreter used to launch the inference script
    pub const DEFAULT_PROGRAM: &str = "python";

    /// Default inference script, relative to the working directory
    pub const DEFAULT_SCRIPT: &str = "run_inference.py";

    /// Default working directory of the inference runtime
    pub const DEFAULT_WORKING_DIR: &str = "/bitnet";

    /// Default model checkpoint
    pub const DEFAULT_MODEL_PATH: &str = "/bitnet/models/BitNet-b1.58-2B-4T/ggml-model-i2_s.gguf";

    /// Default cap on generated tokens
    pub const DEFAULT_MAX_TOKENS: u32 = 50;

    /// Default hard timeout for one inference run
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Build the prompt sent to the language model for a food label
    #[must_use]
    pub fn calorie_prompt(food_label: &str) -> String {
        format!("How many calories are in {food_label}? Answer with just the number.")
    }
}

/// Broker connection defaults
pub mod broker {
    /// Default broker host (docker-compose service name)
    pub const DEFAULT_HOST: &str = "rabbitmq";

    /// Default AMQP port
    pub const DEFAULT_PORT: u16 = 5672;

    /// Default credentials
    pub const DEFAULT_USER: &str = "guest";

    /// Default credentials
    pub const DEFAULT_PASSWORD: &str = "guest";

    /// Heartbeat negotiated with the broker
    pub const DEFAULT_HEARTBEAT_SECS: u16 = 600;

    /// Default URL of the food prediction API, handed to the calorie worker
    pub const DEFAULT_FOOD_API_URL: &str = "http://food_prediction_service:8000";

    /// Bounded policy default attempt count
    pub const DEFAULT_MAX_RETRIES: u32 = 10;

    /// Delay between connection attempts
    pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

    /// AMQP reply code used when closing normally
    pub const CLOSE_REPLY_SUCCESS: u16 = 200;
}

/// Upload validation
pub mod uploads {
    /// 50 MiB per uploaded image
    pub const DEFAULT_MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

    /// Accepted MIME types
    pub const ALLOWED_MIME_TYPES: &[&str] = &["image/png", "image/jpg", "image/jpeg", "image/webp"];

    /// Accepted file extensions, lowercase with leading dot
    pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

    /// Multipart field carrying the images
    pub const FILES_FIELD: &str = "files";

    /// Request body cap is this many maximum-size images
    pub const MAX_FILES_PER_REQUEST: usize = 10;
}

/// HTTP server defaults
pub mod server {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8000;

    /// Default database location
    pub const DEFAULT_DATABASE_URL: &str = "sqlite:./data/thermitrack.db";

    /// Default classifier sidecar endpoint
    pub const DEFAULT_CLASSIFIER_URL: &str = "http://food_classifier:9000/classify";

    /// Default classifier request timeout
    pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;

    /// Requests per minute allowed per client address
    pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 5;

    /// Default request timeout for the whole HTTP request
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
}

/// Service names used in structured logs
pub mod service_names {
    /// HTTP API
    pub const THERMITRACK_SERVER: &str = "thermitrack-server";

    /// Request worker
    pub const CALORIE_WORKER: &str = "calorie-worker";

    /// Response worker
    pub const CALORIE_LISTENER: &str = "calorie-listener";
}
