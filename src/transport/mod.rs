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

//! The raw bidirectional byte channel under a session.
//!
//! A [`Transport`] knows nothing about prompts or modes. It opens one
//! persistent stream, moves bytes, and reports whether the link underneath
//! is still up. [`SshTransport`] is the production implementation;
//! [`mock::ScriptedTransport`] plays a scripted remote side for tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::HostIdentity;
use crate::error::TransportError;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod retry;
mod ssh;

pub use retry::{open_with_retry, RetryPolicy};
pub use ssh::{SshTransport, SshTransportOptions};

#[async_trait]
pub trait Transport: Send {
    /// Establish the link and open the interactive stream.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Tear the link down. Closing an already closed transport is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Liveness of the underlying link, not a cached flag.
    fn is_alive(&self) -> bool;

    /// Write bytes to the remote side.
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `wait` for the next chunk. `Ok(None)` means nothing arrived.
    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Who this transport talks to.
    fn identity(&self) -> &HostIdentity;
}
