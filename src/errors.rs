// ABOUTME: Unified error type, stable error codes, and HTTP error rendering
// ABOUTME: Every fallible library operation returns AppResult so workers and routes share one taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Unified Error Handling
//!
//! A single [`AppError`] type carries a stable [`ErrorCode`], a human-readable
//! message, optional context and an optional source error. Routes render it as
//! JSON through [`IntoResponse`]; workers log it and decide between ack and nack.

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication & Authorization (1000-1999)
    /// No credentials supplied
    AuthRequired = 1000,
    /// Credentials supplied but rejected
    AuthInvalid = 1001,
    /// Token expired
    AuthExpired = 1002,
    /// Authorization header is not a bearer token
    AuthMalformed = 1003,
    /// Caller is authenticated but not allowed to touch the resource
    PermissionDenied = 1004,

    // Rate Limiting (2000-2999)
    /// Too many requests in the current window
    RateLimitExceeded = 2000,

    // Validation (3000-3999)
    /// Generic invalid input
    InvalidInput = 3000,
    /// Required field missing
    MissingRequiredField = 3001,
    /// Malformed payload
    InvalidFormat = 3002,
    /// Uploaded file exceeds the size limit
    PayloadTooLarge = 3003,
    /// Uploaded file has a MIME type or extension outside the allow list
    UnsupportedMediaType = 3004,

    // Resource Management (4000-4999)
    /// Resource does not exist
    ResourceNotFound = 4000,

    // External Services (5000-5999)
    /// External dependency returned an error
    ExternalServiceError = 5000,
    /// External dependency could not be reached
    ExternalServiceUnavailable = 5001,
    /// Message broker connection, declare, publish or consume failed
    MessageBrokerError = 5002,
    /// Inference process failed to start or exited non-zero
    InferenceFailed = 5003,
    /// Inference process exceeded its deadline
    InferenceTimeout = 5004,
    /// Inference output contained no usable number
    OutputUnparseable = 5005,

    // Configuration (6000-6999)
    /// Configuration error
    ConfigError = 6000,

    // Internal Errors (9000-9999)
    /// Unexpected internal error
    InternalError = 9000,
    /// Database operation failed
    DatabaseError = 9001,
    /// Serialization or deserialization failed
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::MissingRequiredField | Self::InvalidFormat => 400,

            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired | Self::AuthMalformed => {
                401
            }

            Self::PermissionDenied => 403,
            Self::ResourceNotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::UnsupportedMediaType => 415,
            Self::RateLimitExceeded => 429,

            Self::ExternalServiceError
            | Self::ExternalServiceUnavailable
            | Self::InferenceFailed
            | Self::OutputUnparseable => 502,

            Self::MessageBrokerError => 503,
            Self::InferenceTimeout => 504,

            Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::AuthMalformed => "The authentication header is malformed",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::RateLimitExceeded => "Rate limit exceeded. Please slow down your requests",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::InvalidFormat => "The data format is invalid",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ExternalServiceError => "An external service encountered an error",
            Self::ExternalServiceUnavailable => "An external service is currently unavailable",
            Self::MessageBrokerError => "The message broker is unavailable",
            Self::InferenceFailed => "Calorie inference failed",
            Self::InferenceTimeout => "Calorie inference timed out",
            Self::OutputUnparseable => "Calorie inference output could not be parsed",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// Resource ID if applicable (prediction document id, queue name)
    pub resource_id: Option<String>,
    /// Additional key-value context
    pub details: serde_json::Value,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            request_id: None,
            resource_id: None,
            details: serde_json::Value::Null,
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add a request ID to the error context
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context.request_id = Some(request_id.into());
        self
    }

    /// Add a resource ID to the error context
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.context.resource_id = Some(resource_id.into());
        self
    }

    /// Add details to the error context
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Request ID, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Extra details
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
                request_id: error.context.request_id,
                details: error.context.details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = ?self.code, error = %self, "Request failed");
        } else {
            tracing::debug!(code = ?self.code, error = %self, "Request rejected");
        }
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

/// Convenience functions for creating common errors
impl AppError {
    /// Authentication required
    #[must_use]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, message)
    }

    /// Invalid authentication
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Authentication expired
    #[must_use]
    pub fn auth_expired() -> Self {
        Self::new(ErrorCode::AuthExpired, "Token has expired")
    }

    /// Malformed authorization header
    #[must_use]
    pub fn auth_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthMalformed, message)
    }

    /// Caller may not act on the resource
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Rate limit exceeded
    #[must_use]
    pub fn rate_limit_exceeded(limit: u32, retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit of {limit} requests per minute exceeded"),
        )
        .with_details(serde_json::json!({
            "limit": limit,
            "retry_after_secs": retry_after_secs,
        }))
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required field missing
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {field}"),
        )
    }

    /// Uploaded file too large
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayloadTooLarge, message)
    }

    /// Uploaded file type not allowed
    #[must_use]
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedMediaType, message)
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// External service error
    #[must_use]
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// Message broker error
    #[must_use]
    pub fn broker(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MessageBrokerError, message)
    }

    /// Inference process failure
    #[must_use]
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InferenceFailed, message)
    }

    /// Inference process timeout
    #[must_use]
    pub fn inference_timeout(timeout_secs: u64) -> Self {
        Self::new(
            ErrorCode::InferenceTimeout,
            format!("Inference did not finish within {timeout_secs}s"),
        )
    }

    /// Inference output without a usable number
    #[must_use]
    pub fn output_unparseable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutputUnparseable, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, error.to_string()).with_source(error)
    }
}

impl From<lapin::Error> for AppError {
    fn from(error: lapin::Error) -> Self {
        Self::new(ErrorCode::MessageBrokerError, error.to_string()).with_source(error)
    }
}

/// Conversion from `anyhow::Error` to `AppError`
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.source() {
            Some(source) => Self::new(ErrorCode::InternalError, error.to_string())
                .with_details(serde_json::json!({ "source": source.to_string() })),
            None => Self::new(ErrorCode::InternalError, error.to_string()),
        }
    }
}
