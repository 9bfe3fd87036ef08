// ABOUTME: Firebase ID token verification against Google's published signing certificates
// ABOUTME: Certificates are converted to RSA public keys and cached for the Cache-Control lifetime
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! Firebase ID token verification
//!
//! - Signing certificates come from Google's `securetoken` endpoint
//! - Keys are cached for the advertised `max-age` (at least five minutes)
//! - Tokens must be RS256, unexpired, issued by `securetoken.google.com/<project>`
//!   and addressed to the configured project

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use super::{AuthenticatedUser, TokenVerifier};
use crate::config::FirebaseConfig;
use crate::errors::{AppError, AppResult, ErrorCode};

/// Google's Firebase signing certificates
const FIREBASE_CERTS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Issuer prefix; the project id completes it
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Lower bound on the key cache lifetime
const MIN_CACHE_TTL_SECS: i64 = 300;

/// Public keys by key id, valid until `expires_at`
struct SigningKeys {
    keys: HashMap<String, String>,
    expires_at: DateTime<Utc>,
}

impl SigningKeys {
    fn fresh_key(&self, kid: &str) -> Option<&String> {
        (self.expires_at > Utc::now())
            .then(|| self.keys.get(kid))
            .flatten()
    }
}

/// Claims read from a Firebase ID token
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    firebase: ProviderClaims,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderClaims {
    sign_in_provider: Option<String>,
}

/// Firebase token verifier with a shared key cache
pub struct FirebaseAuth {
    config: FirebaseConfig,
    http_client: Client,
    signing_keys: RwLock<Option<SigningKeys>>,
}

impl FirebaseAuth {
    /// Verifier for the configured project
    #[must_use]
    pub fn new(config: FirebaseConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
            signing_keys: RwLock::new(None),
        }
    }

    /// Check if Firebase authentication is enabled and configured
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    async fn decode_token(&self, token: &str) -> AppResult<IdTokenClaims> {
        let project_id = self
            .config
            .project_id
            .as_deref()
            .filter(|_| self.config.enabled)
            .ok_or_else(|| AppError::config("Firebase authentication is not configured"))?;

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode Firebase token header");
            AppError::auth_invalid("Invalid token")
        })?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::auth_invalid("Token missing key ID"))?;

        let pem = self.signing_key(&kid).await?;
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Invalid public key for {kid}: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[project_id]);
        validation.set_issuer(&[format!("{FIREBASE_ISSUER_PREFIX}{project_id}")]);

        decode::<IdTokenClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Firebase token validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AppError::auth_expired(),
                    _ => AppError::auth_invalid("Invalid token"),
                }
            })
    }

    /// PEM public key for `kid`, refreshing the cache when stale or missing the key
    async fn signing_key(&self, kid: &str) -> AppResult<String> {
        if let Some(pem) = self
            .signing_keys
            .read()
            .await
            .as_ref()
            .and_then(|cached| cached.fresh_key(kid).cloned())
        {
            return Ok(pem);
        }

        let fetched = self.fetch_signing_keys().await?;
        let pem = fetched.keys.get(kid).cloned();
        *self.signing_keys.write().await = Some(fetched);

        pem.ok_or_else(|| AppError::auth_invalid("Unknown token signing key"))
    }

    async fn fetch_signing_keys(&self) -> AppResult<SigningKeys> {
        info!("Fetching Firebase public keys from Google");
        let response = self
            .http_client
            .get(FIREBASE_CERTS_URL)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                AppError::external_service("Firebase", format!("Failed to fetch public keys: {e}"))
            })?;

        let configured_ttl = i64::try_from(self.config.key_cache_ttl_secs).unwrap_or(i64::MAX);
        let ttl = response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(configured_ttl)
            .max(MIN_CACHE_TTL_SECS);

        let certificates: HashMap<String, String> = response.json().await.map_err(|e| {
            AppError::external_service("Firebase", format!("Failed to parse public keys: {e}"))
        })?;

        let keys = certificates_to_public_keys(certificates)?;
        let expires_at = Utc::now() + Duration::seconds(ttl);
        info!(num_keys = keys.len(), cache_ttl_secs = ttl, "Firebase public keys cached");
        Ok(SigningKeys { keys, expires_at })
    }
}

#[async_trait]
impl TokenVerifier for FirebaseAuth {
    async fn verify(&self, token: &str) -> AppResult<AuthenticatedUser> {
        let claims = match self.decode_token(token).await {
            Ok(claims) => claims,
            Err(e) if e.code == ErrorCode::AuthExpired => {
                warn!("Expired Firebase token");
                return Err(e);
            }
            Err(e) if e.code == ErrorCode::AuthInvalid => {
                warn!(reason = %e.message, "Invalid Firebase token");
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "Error verifying Firebase token");
                return Err(AppError::auth_invalid("Could not verify token").with_source(e));
            }
        };

        let user = AuthenticatedUser {
            uid: claims.sub,
            email: claims.email,
            provider: claims
                .firebase
                .sign_in_provider
                .unwrap_or_else(|| "unknown".to_owned()),
        };
        debug!(user_id = %user.uid, provider = %user.provider, "Firebase token verified");
        Ok(user)
    }
}

/// Convert X.509 certificates to PEM public keys, skipping unreadable ones
fn certificates_to_public_keys(
    certificates: HashMap<String, String>,
) -> AppResult<HashMap<String, String>> {
    let keys: HashMap<String, String> = certificates
        .into_iter()
        .filter_map(|(kid, certificate)| match public_key_pem(&certificate) {
            Ok(pem) => Some((kid, pem)),
            Err(e) => {
                warn!(kid = %kid, error = %e, "Skipping unreadable Firebase certificate");
                None
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(AppError::external_service(
            "Firebase",
            "No valid public keys in response",
        ));
    }
    Ok(keys)
}

/// `max-age` from a Cache-Control header value
fn parse_max_age(cache_control: &str) -> Option<i64> {
    cache_control
        .split(',')
        .find_map(|directive| directive.trim().strip_prefix("max-age="))
        .and_then(|seconds| seconds.parse().ok())
}

/// SubjectPublicKeyInfo of a PEM certificate, re-encoded as a PEM public key
fn public_key_pem(certificate: &str) -> AppResult<String> {
    let (_, pem) = parse_x509_pem(certificate.as_bytes())
        .map_err(|e| AppError::internal(format!("Failed to parse X.509 PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| AppError::internal(format!("Failed to parse X.509 certificate: {e}")))?;

    let encoded = STANDARD.encode(cert.public_key().raw);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(64)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    Ok(format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        lines.join("\n")
    ))
}
