// ABOUTME: Axum HTTP testing utilities for integration tests
// ABOUTME: Builds JSON and multipart requests and runs them against a Router without a server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde::Serialize;
use tower::ServiceExt;

const MULTIPART_BOUNDARY: &str = "thermitrack-test-boundary";

/// Helper to build and execute HTTP requests against Axum routers
pub struct AxumTestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    peer: Option<SocketAddr>,
}

impl AxumTestRequest {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: Vec::new(),
            peer: None,
        }
    }

    /// Create a new GET request
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Create a new POST request
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Create a new PUT request
    #[allow(dead_code)]
    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// Create a new DELETE request
    #[allow(dead_code)]
    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Add a header to the request
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Add `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {token}"))
    }

    /// Pretend the request came from `addr`
    #[allow(dead_code)]
    pub const fn peer(mut self, addr: SocketAddr) -> Self {
        self.peer = Some(addr);
        self
    }

    /// Add JSON body to the request
    #[allow(dead_code)]
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = serde_json::to_vec(data).expect("Failed to serialize JSON");
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/json".to_owned(),
        ));
        self
    }

    /// Add a multipart body with one part per file
    #[allow(dead_code)]
    pub fn multipart(mut self, parts: &[MultipartFile]) -> Self {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.field, part.filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
            body.extend_from_slice(&part.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        self.body = body;
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        ));
        self
    }

    /// Execute the request against an Axum router
    pub async fn send(self, app: Router) -> AxumTestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);

        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }
        if let Some(addr) = self.peer {
            builder = builder.extension(ConnectInfo(addr));
        }

        let request = builder
            .body(Body::from(self.body))
            .expect("Failed to build request");

        let response = app
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        AxumTestResponse::from_response(response).await
    }
}

/// One file part of a multipart body
pub struct MultipartFile {
    /// Form field name
    pub field: String,
    /// Client filename
    pub filename: String,
    /// Declared MIME type
    pub content_type: String,
    /// Contents
    pub bytes: Vec<u8>,
}

impl MultipartFile {
    /// A part in the `files` field
    #[allow(dead_code)]
    pub fn image(filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        Self {
            field: "files".to_owned(),
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            bytes: bytes.to_vec(),
        }
    }
}

/// Wrapper around Axum HTTP response for testing
pub struct AxumTestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl AxumTestResponse {
    /// Create from response by eagerly reading the body
    async fn from_response(response: axum::http::Response<Body>) -> Self {
        use axum::body::to_bytes;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the response status code as u16 for easy assertion
    pub const fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Header value as a string
    #[allow(dead_code)]
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Get the response body as a JSON value
    pub fn json<T: serde::de::DeserializeOwned>(self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize JSON response")
    }

    /// Error message of a JSON error body
    #[allow(dead_code)]
    pub fn error_message(self) -> String {
        let body: serde_json::Value = self.json();
        body["error"]["message"]
            .as_str()
            .expect("error.message missing")
            .to_owned()
    }
}
