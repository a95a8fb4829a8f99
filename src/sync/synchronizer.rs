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

//! Send one command and read until its prompt comes back.

use std::time::Duration;
use tokio::time::Instant;

use super::markers::{is_multiline, PromptMarkers, PromptState};
use crate::error::TransportError;
use crate::transport::Transport;

/// Upper bound on reads spent discarding stale output before a send.
const MAX_DRAIN_READS: usize = 256;

/// Pacing of the read loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Longest single wait for the next chunk.
    pub poll_interval: Duration,
    /// Silence tolerated in a continuation state before nudging with a blank line.
    pub continuation_grace: Duration,
    /// Wait used while draining stale bytes.
    pub drain_wait: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            continuation_grace: Duration::from_millis(500),
            drain_wait: Duration::from_millis(10),
        }
    }
}

/// A completed exchange: everything read up to and including the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub output: String,
    pub elapsed: Duration,
    pub blank_lines_sent: u32,
}

/// Why an exchange did not complete.
#[derive(Debug)]
pub enum SyncFailure {
    /// No prompt before the deadline. The remote side may still be running.
    Timeout { output: String, elapsed: Duration },
    /// The link failed while sending or reading.
    Transport {
        error: TransportError,
        output: String,
    },
}

/// Discard whatever the remote side has already sent. Returns the byte count.
pub async fn drain<T: Transport + ?Sized>(
    transport: &mut T,
    wait: Duration,
) -> Result<usize, TransportError> {
    let mut discarded = 0;
    for _ in 0..MAX_DRAIN_READS {
        match transport.recv(wait).await? {
            Some(chunk) if !chunk.is_empty() => discarded += chunk.len(),
            _ => break,
        }
    }
    if discarded > 0 {
        tracing::trace!("Discarded {} stale bytes", discarded);
    }
    Ok(discarded)
}

/// Clear stale output, send `text` plus a newline, then read until `markers`
/// reports completion or `timeout` elapses.
pub async fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    text: &str,
    markers: &PromptMarkers,
    timeout: Duration,
    options: &SyncOptions,
) -> Result<Exchange, SyncFailure> {
    let started = Instant::now();
    let deadline = started + timeout;
    let transport_failure = |error, raw: &[u8]| SyncFailure::Transport {
        error,
        output: String::from_utf8_lossy(raw).into_owned(),
    };

    drain(transport, options.drain_wait)
        .await
        .map_err(|e| transport_failure(e, &[]))?;

    transport
        .send(format!("{text}\n").as_bytes())
        .await
        .map_err(|e| transport_failure(e, &[]))?;

    let multiline = is_multiline(text);
    let mut raw: Vec<u8> = Vec::new();
    let mut last_data = Instant::now();
    let mut block_closed = false;
    let mut nudged = false;
    let mut blank_lines_sent = 0;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(SyncFailure::Timeout {
                output: String::from_utf8_lossy(&raw).into_owned(),
                elapsed: now - started,
            });
        }
        let wait = options.poll_interval.min(deadline - now);

        match transport.recv(wait).await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                tracing::trace!("Read {} bytes", chunk.len());
                raw.extend_from_slice(&chunk);
                last_data = Instant::now();
                let buffer = String::from_utf8_lossy(&raw);
                match markers.state(&buffer) {
                    PromptState::Complete => {
                        let elapsed = started.elapsed();
                        tracing::debug!("Prompt seen after {:?}", elapsed);
                        return Ok(Exchange {
                            output: buffer.into_owned(),
                            elapsed,
                            blank_lines_sent,
                        });
                    }
                    PromptState::Continuation if multiline && !block_closed => {
                        tracing::debug!("Continuation prompt, closing block with a blank line");
                        block_closed = true;
                        blank_lines_sent += 1;
                        transport
                            .send(b"\n")
                            .await
                            .map_err(|e| transport_failure(e, &raw))?;
                    }
                    _ => {}
                }
            }
            Ok(_) => {
                let stalled = last_data.elapsed() >= options.continuation_grace;
                if multiline && !nudged && stalled {
                    let buffer = String::from_utf8_lossy(&raw);
                    if markers.state(&buffer) == PromptState::Continuation {
                        tracing::debug!("No output for {:?} in a block, sending a blank line", options.continuation_grace);
                        nudged = true;
                        blank_lines_sent += 1;
                        transport
                            .send(b"\n")
                            .await
                            .map_err(|e| transport_failure(e, &raw))?;
                    }
                }
            }
            Err(e) => return Err(transport_failure(e, &raw)),
        }
    }
}
