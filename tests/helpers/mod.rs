// ABOUTME: Shared test helpers and utilities for integration tests
// ABOUTME: Exports the router harness, HTTP request helpers and in-memory fakes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(dead_code)]

pub mod app;
pub mod axum_test;
pub mod fakes;
