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

use serde::Serialize;
use std::time::Duration;

use super::SessionMode;
use crate::sync::{clean_output, contains_error, CONTINUATION_PROMPT};

/// How an exchange that reached the remote side ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Ok,
    /// The prompt came back but the output carries a stack trace.
    InterpreterError,
    /// No prompt before the deadline; the channel is in an unknown state.
    TransportTimeout,
    /// The link failed and could not be recovered within the retry budget.
    TransportError,
    /// The link was rebuilt during an interpreter exchange. The command was
    /// not re-issued, the session is back in shell mode and every
    /// interpreter binding made before is gone.
    SessionReset,
}

/// Result of one command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub kind: OutcomeKind,
    pub command: String,
    pub mode: SessionMode,
    /// Everything captured for this command, prompt included.
    pub output: String,
    pub detail: Option<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// The line written when it differs from `command`.
    #[serde(skip)]
    sent: Option<String>,
}

impl CommandOutcome {
    /// Classify a completed exchange by scanning for the error marker.
    pub(crate) fn completed(
        command: &str,
        mode: SessionMode,
        output: String,
        elapsed: Duration,
    ) -> Self {
        if contains_error(&output) {
            Self {
                kind: OutcomeKind::InterpreterError,
                command: command.to_string(),
                mode,
                detail: Some(output.clone()),
                output,
                elapsed,
                sent: None,
            }
        } else {
            Self {
                kind: OutcomeKind::Ok,
                command: command.to_string(),
                mode,
                output,
                detail: None,
                elapsed,
                sent: None,
            }
        }
    }

    pub(crate) fn failed(
        kind: OutcomeKind,
        command: &str,
        mode: SessionMode,
        output: String,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            kind,
            command: command.to_string(),
            mode,
            output,
            detail: Some(detail.into()),
            elapsed,
            sent: None,
        }
    }

    /// Record that `sent` went over the wire in place of `command`.
    pub(crate) fn with_sent(mut self, sent: &str) -> Self {
        if sent != self.command {
            self.sent = Some(sent.to_string());
        }
        self
    }

    pub fn is_ok(&self) -> bool {
        self.kind == OutcomeKind::Ok
    }

    pub fn is_interpreter_error(&self) -> bool {
        self.kind == OutcomeKind::InterpreterError
    }

    /// True when the failure came from the link rather than the remote code.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self.kind,
            OutcomeKind::TransportTimeout | OutcomeKind::TransportError | OutcomeKind::SessionReset
        )
    }

    /// Captured output without terminal escapes, the command echo and the trailing prompt.
    pub fn text(&self) -> String {
        let cleaned = clean_output(&self.output);
        let mut lines: Vec<&str> = cleaned.lines().collect();

        if let Some(last) = lines.last() {
            if self.kind != OutcomeKind::TransportTimeout || last.trim().is_empty() {
                lines.pop();
            }
        }

        let mut echoed = self.sent.as_deref().unwrap_or(&self.command).lines().peekable();
        let mut start = 0;
        while start < lines.len() {
            let line = strip_continuations(lines[start]);
            match echoed.peek() {
                Some(expected) if line.trim_end() == expected.trim_end() => {
                    echoed.next();
                    start += 1;
                }
                _ => break,
            }
        }
        while start < lines.len() && strip_continuations(lines[start]).trim().is_empty() {
            start += 1;
        }

        lines[start..].join("\n")
    }

    /// The most useful line for a one-line report.
    pub fn summary(&self) -> String {
        match self.kind {
            OutcomeKind::Ok => "ok".to_string(),
            OutcomeKind::InterpreterError => self
                .text()
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("interpreter error")
                .to_string(),
            _ => self.detail.clone().unwrap_or_else(|| format!("{:?}", self.kind)),
        }
    }
}

fn strip_continuations(mut line: &str) -> &str {
    while let Some(rest) = line.strip_prefix(CONTINUATION_PROMPT) {
        line = rest;
    }
    line
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
