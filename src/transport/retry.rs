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

use std::time::Duration;

use super::Transport;
use crate::error::TransportError;

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attempts actually made; a policy of zero still tries once.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after the `failed_attempt`-th failure (1-based): `base * 2^(n-1)`, capped.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let jitter = fastrand::u64(0..=delay.as_millis() as u64 / 4);
            delay + Duration::from_millis(jitter)
        } else {
            delay
        }
    }
}

/// Open `transport`, retrying with backoff. Returns how many attempts it took.
pub async fn open_with_retry<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
) -> Result<u32, TransportError> {
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match transport.open().await {
            Ok(()) => {
                tracing::debug!(
                    "Connected to {} on attempt {}",
                    transport.identity(),
                    attempt
                );
                return Ok(attempt);
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "Connection attempt {}/{} to {} failed: {}. Retrying in {:?}",
                    attempt,
                    attempts,
                    transport.identity(),
                    e,
                    delay
                );
                let _ = transport.close().await;
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to connect to {} after {} attempts: {}",
                    transport.identity(),
                    attempts,
                    e
                );
                return Err(e);
            }
        }
    }
}
