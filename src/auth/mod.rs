// ABOUTME: Bearer-token authentication for the HTTP API
// ABOUTME: Parses the Authorization header and delegates verification to a TokenVerifier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Authentication
//!
//! Every non-health route calls [`authenticate`] with the request headers.
//! Verification itself is opaque behind [`TokenVerifier`]; production uses
//! [`firebase::FirebaseAuth`].

/// Firebase ID token verification
pub mod firebase;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;

pub use firebase::FirebaseAuth;

const BEARER_PREFIX: &str = "Bearer ";

/// Caller identity established from a verified token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Firebase user id
    pub uid: String,
    /// Email claim, if present
    pub email: Option<String>,
    /// Sign-in provider (`password`, `google.com`, ...)
    pub provider: String,
}

/// Verifies an ID token
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Claims of a valid token
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` for an expired token and `AuthInvalid` otherwise
    async fn verify(&self, token: &str) -> AppResult<AuthenticatedUser>;
}

/// Token part of an `Authorization: Bearer <token>` header value
///
/// # Errors
///
/// Returns `AuthRequired` when the header is absent or empty and
/// `AuthMalformed` when it does not use the bearer scheme
pub fn extract_bearer(header: Option<&str>) -> AppResult<&str> {
    let value = header
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::auth_required("Authorization header missing"))?;

    value
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| AppError::auth_malformed("Invalid Authorization header format"))
}

/// Authenticate a request from its headers
///
/// # Errors
///
/// Returns a 401-class error when the header is missing, malformed or the
/// token fails verification
pub async fn authenticate(
    headers: &HeaderMap,
    verifier: &dyn TokenVerifier,
) -> AppResult<AuthenticatedUser> {
    let header = match headers.get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::auth_malformed("Invalid Authorization header format"))?,
        ),
        None => None,
    };
    let token = extract_bearer(header)?;

    match verifier.verify(token).await {
        Ok(user) => Ok(user),
        Err(e) => {
            AppLogger::log_auth_event("anonymous", "verify_token", false, Some(&e.message));
            Err(e)
        }
    }
}
