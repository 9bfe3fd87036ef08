// ABOUTME: Runs the BitNet inference script as a child process with a hard timeout
// ABOUTME: Non-zero exit surfaces stderr, stdout goes through the first-number parser
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{extract_calories, CalorieEstimator};
use crate::config::InferenceConfig;
use crate::constants::inference::calorie_prompt;
use crate::errors::{AppError, AppResult};

/// Estimator backed by `run_inference.py`
///
/// Invocation: `<program> [script args...] -m <model> -p <prompt> -n <max tokens>`
/// in the configured working directory. The child is killed when the deadline
/// passes.
#[derive(Debug, Clone)]
pub struct BitNetEstimator {
    config: InferenceConfig,
}

impl BitNetEstimator {
    /// Estimator for the given process settings
    #[must_use]
    pub const fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    fn command(&self, prompt: &str) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.script_args)
            .arg("-m")
            .arg(&self.config.model_path)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(self.config.max_tokens.to_string())
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CalorieEstimator for BitNetEstimator {
    async fn estimate(&self, food_label: &str) -> AppResult<i64> {
        let prompt = calorie_prompt(food_label);
        debug!(food_label = %food_label, program = %self.config.program, "Running inference");

        let output = timeout(self.config.timeout, self.command(&prompt).output())
            .await
            .map_err(|_| {
                warn!(food_label = %food_label, "Inference timed out");
                AppError::inference_timeout(self.config.timeout.as_secs())
            })?
            .map_err(|e| {
                AppError::inference_failed(format!(
                    "Failed to start inference process {}: {e}",
                    self.config.program
                ))
                .with_source(e)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                AppError::inference_failed(format!("Inference failed: {}", stderr.trim()))
                    .with_details(json!({ "exit_code": output.status.code() })),
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let calories = extract_calories(&stdout)?;
        info!(food_label = %food_label, calories, "Predicted calories");
        Ok(calories)
    }
}
