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

//! Structured results out of a text-only interpreter channel.
//!
//! The caller's statement runs inside generated wrapper code that catches
//! any exception and writes a JSON [`ResultEnvelope`] to an agreed path on
//! the robot. The envelope is then printed back between two sentinels in
//! the same interpreter session and parsed here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SessionError;
use crate::session::{CommandOutcome, OutcomeKind, Session, SessionMode};
use crate::transport::Transport;

const BEGIN_SENTINEL: &str = "<<OTSH>>";
const END_SENTINEL: &str = "<<END>>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// `{"status", "data", "error", "traceback"}` as written by the wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
}

impl ResultEnvelope {
    pub fn success(data: Option<serde_json::Value>) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            data,
            error: None,
            traceback: None,
        }
    }

    pub fn error(error: impl Into<String>, traceback: Option<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            data: None,
            error: Some(error.into()),
            traceback,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }

    /// Parse a raw envelope, falling back to an error envelope that carries
    /// the raw text when it is not valid JSON.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw.trim()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Unparseable result envelope: {:?}", raw);
                Self::error(
                    format!("Failed to parse results: {e}"),
                    Some(raw.to_string()),
                )
            }
        }
    }

    /// Pull the envelope out of interpreter output that contains the sentinels.
    pub fn extract(output: &str) -> Self {
        let payload = output.find(BEGIN_SENTINEL).and_then(|start| {
            let rest = &output[start + BEGIN_SENTINEL.len()..];
            rest.find(END_SENTINEL).map(|end| &rest[..end])
        });
        match payload {
            Some(payload) => Self::parse(payload),
            None => Self::error(
                "Failed to parse results: no envelope in output",
                Some(output.to_string()),
            ),
        }
    }
}

/// Render `text` as a Python string literal.
///
/// A JSON string is also a valid Python literal.
pub(crate) fn py_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Turn arbitrary source into a single REPL line that runs it as a module body.
pub fn exec_statement(code: &str) -> String {
    format!("exec(compile({}, '<otsh>', 'exec'))", py_literal(code))
}

/// Source that runs `statement`, evaluates `result_expr` as the payload and
/// writes the envelope to `results_path`.
pub fn wrapper_code(statement: &str, result_expr: Option<&str>, results_path: &str) -> String {
    let data = result_expr.unwrap_or("None");
    format!(
        "import json as _otsh_json, traceback as _otsh_tb\n\
         try:\n\
         \x20   exec(compile({stmt}, '<otsh>', 'exec'))\n\
         \x20   _otsh_env = {{'status': 'success', 'data': ({data}), 'error': None, 'traceback': None}}\n\
         except Exception as _otsh_exc:\n\
         \x20   _otsh_env = {{'status': 'error', 'data': None, 'error': str(_otsh_exc), 'traceback': _otsh_tb.format_exc()}}\n\
         with open({path}, 'w') as _otsh_f:\n\
         \x20   _otsh_json.dump(_otsh_env, _otsh_f, default=str)\n",
        stmt = py_literal(statement),
        path = py_literal(results_path),
    )
}

/// Statement printing the envelope file between the sentinels.
///
/// The sentinels are split in the source so the echoed command never
/// contains them.
pub fn read_back_statement(results_path: &str) -> String {
    let (b1, b2) = BEGIN_SENTINEL.split_at(4);
    let (e1, e2) = END_SENTINEL.split_at(4);
    format!(
        "print('{b1}' + '{b2}' + open({}).read() + '{e1}' + '{e2}')",
        py_literal(results_path)
    )
}

fn outcome_failure(step: &str, outcome: &CommandOutcome) -> ResultEnvelope {
    ResultEnvelope::error(
        format!("{step} failed: {}", outcome.summary()),
        Some(outcome.text()),
    )
}

impl<T: Transport> Session<T> {
    /// Run `statement` in the interpreter and return its envelope.
    ///
    /// `result_expr` is evaluated after the statement and becomes `data`.
    /// Remote exceptions come back as an error envelope, not as an
    /// [`OutcomeKind::InterpreterError`].
    pub async fn execute_enveloped(
        &self,
        statement: &str,
        result_expr: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ResultEnvelope, SessionError> {
        self.ensure_mode(SessionMode::Interpreter).await?;
        let path = self.settings().results_path.clone();

        let wrapper = exec_statement(&wrapper_code(statement, result_expr, &path));
        let run = self
            .execute(&wrapper, SessionMode::Interpreter, timeout)
            .await?;
        if !run.is_ok() {
            return Ok(outcome_failure("statement", &run));
        }

        let read = self
            .execute(
                &read_back_statement(&path),
                SessionMode::Interpreter,
                Some(self.settings().ping_timeout),
            )
            .await?;
        // The envelope may itself carry a traceback, which trips the error scan.
        match read.kind {
            OutcomeKind::Ok | OutcomeKind::InterpreterError => {
                Ok(ResultEnvelope::extract(&read.output))
            }
            _ => Ok(outcome_failure("reading results", &read)),
        }
    }
}
