// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sequential execution of described commands.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::envelope::exec_statement;
use crate::error::SessionError;
use crate::session::{CommandOutcome, Session, SessionMode};
use crate::transport::Transport;

/// One step of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub description: String,
    pub command: String,
}

impl BatchItem {
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
        }
    }
}

impl<D: Into<String>, C: Into<String>> From<(D, C)> for BatchItem {
    fn from((description, command): (D, C)) -> Self {
        Self::new(description, command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Pause between consecutive items so the channel goes quiet first.
    pub delay_between: Duration,
    pub stop_on_error: bool,
    /// Overrides the session's command timeout for every item.
    pub timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            delay_between: Duration::from_millis(500),
            stop_on_error: false,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemResult {
    pub description: String,
    pub command: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn from_outcome(description: &str, outcome: &CommandOutcome) -> Self {
        let error = (!outcome.is_ok()).then(|| {
            outcome
                .detail
                .clone()
                .unwrap_or_else(|| outcome.summary())
        });
        Self {
            description: description.to_string(),
            command: outcome.command.clone(),
            success: outcome.is_ok(),
            output: outcome.text(),
            error,
        }
    }

    /// An item that never reached the remote side.
    pub fn rejected(description: &str, command: &str, error: &SessionError) -> Self {
        Self {
            description: description.to_string(),
            command: command.to_string(),
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Run `items` in order in `mode`.
///
/// The session is switched to `mode` once, up front. Each item takes the
/// session lock on its own, so unrelated callers may interleave between
/// items. With `stop_on_error` the result ends at the first failed item.
pub async fn run_batch<T: Transport>(
    session: &Session<T>,
    mode: SessionMode,
    items: &[BatchItem],
    options: &BatchOptions,
) -> Result<Vec<BatchItemResult>, SessionError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    session.ensure_mode(mode).await?;

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if index > 0 && !options.delay_between.is_zero() {
            tokio::time::sleep(options.delay_between).await;
        }

        tracing::debug!("[{}/{}] {}", index + 1, items.len(), item.description);
        let result = match session.execute(&item.command, mode, options.timeout).await {
            Ok(outcome) => BatchItemResult::from_outcome(&item.description, &outcome),
            Err(e) => BatchItemResult::rejected(&item.description, &item.command, &e),
        };

        let failed = !result.success;
        if failed {
            tracing::warn!(
                "Batch item '{}' failed: {}",
                item.description,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        results.push(result);

        if failed && options.stop_on_error {
            tracing::info!(
                "Stopping batch after item {} of {}",
                index + 1,
                items.len()
            );
            break;
        }
    }
    Ok(results)
}

impl<T: Transport> Session<T> {
    /// Send a multi-line source block as one interpreter statement.
    ///
    /// The block is compiled and executed remotely as a whole, so its
    /// indentation and blank lines never reach the REPL line reader.
    pub async fn send_code_block(
        &self,
        code: &str,
        description: &str,
        timeout: Option<Duration>,
    ) -> BatchItemResult {
        if let Err(e) = self.ensure_mode(SessionMode::Interpreter).await {
            return BatchItemResult::rejected(description, code, &e);
        }
        let statement = exec_statement(code);
        match self
            .execute(&statement, SessionMode::Interpreter, timeout)
            .await
        {
            Ok(outcome) => {
                let mut result = BatchItemResult::from_outcome(description, &outcome);
                result.command = code.to_string();
                result
            }
            Err(e) => BatchItemResult::rejected(description, code, &e),
        }
    }
}
