// ABOUTME: Calorie estimation contract and the output parser shared by all estimators
// ABOUTME: Extraction keeps the first digit run before the runtime's timing logs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Calorie Inference
//!
//! [`CalorieEstimator`] turns a food label into an integer calorie count.
//! The production estimator is [`bitnet::BitNetEstimator`], which runs the
//! BitNet inference script as a child process and parses its text output with
//! [`extract_calories`].
//!
//! The parser is a first-number heuristic: the model is asked for a bare number
//! but nothing guarantees the format, so anything after the runtime's
//! `llama_perf_` logs is discarded and the first digit run wins.

/// BitNet child-process estimator
pub mod bitnet;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::constants::inference::LOG_NOISE_MARKER;
use crate::errors::{AppError, AppResult};

pub use bitnet::BitNetEstimator;

/// First run of ASCII digits
static DIGIT_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[0-9]+").ok());

/// Estimates calories for a food label
#[async_trait]
pub trait CalorieEstimator: Send + Sync {
    /// Estimated calories of one serving of `food_label`
    ///
    /// # Errors
    ///
    /// Returns `InferenceFailed`, `InferenceTimeout` or `OutputUnparseable`.
    /// No retry happens inside an estimator.
    async fn estimate(&self, food_label: &str) -> AppResult<i64>;
}

/// Extract the calorie count from raw inference output
///
/// # Errors
///
/// Returns `OutputUnparseable` when no digit run precedes the log marker or the
/// run does not fit in an `i64`
pub fn extract_calories(output: &str) -> AppResult<i64> {
    let text = output
        .split_once(LOG_NOISE_MARKER)
        .map_or(output, |(before, _)| before);

    let pattern = DIGIT_RUN
        .as_ref()
        .ok_or_else(|| AppError::internal("Digit pattern failed to compile"))?;

    let digits = pattern
        .find(text)
        .ok_or_else(|| AppError::output_unparseable(format!("No calories found in output: {text}")))?;

    digits.as_str().parse::<i64>().map_err(|e| {
        AppError::output_unparseable(format!("Calorie value out of range: {}", digits.as_str()))
            .with_source(e)
    })
}
