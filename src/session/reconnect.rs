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

//! Link recovery: `Connected -> Reconnecting -> Connected | Failed`.

use serde::Serialize;
use std::fmt;

use super::{SessionInner, SessionMode, SessionSettings};
use crate::error::SessionError;
use crate::sync::drain;
use crate::transport::{open_with_retry, Transport};

/// State of the link under a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Never connected, or closed by the caller.
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
    /// Reconnection gave up. Every call fails fast until `connect()`.
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bring a fresh link up: open with retries, let the login banner settle,
/// discard it, and start in shell mode.
pub(super) async fn establish<T: Transport>(
    inner: &mut SessionInner<T>,
    settings: &SessionSettings,
) -> Result<u32, SessionError> {
    let _ = inner.transport.close().await;
    let attempts = open_with_retry(&mut inner.transport, &settings.retry).await?;
    if !settings.settle.is_zero() {
        tokio::time::sleep(settings.settle).await;
    }
    drain(&mut inner.transport, settings.sync.drain_wait).await?;
    inner.mode = SessionMode::Shell;
    inner.link = LinkState::Connected;
    Ok(attempts)
}

/// Re-establish a dropped link.
///
/// On success the session is in shell mode. If it was in the interpreter
/// before, everything defined there is gone and this is logged as a
/// warning; callers see it as [`OutcomeKind::SessionReset`](super::OutcomeKind::SessionReset).
/// On failure the session is `Failed`.
pub(super) async fn recover<T: Transport>(
    inner: &mut SessionInner<T>,
    settings: &SessionSettings,
) -> Result<(), SessionError> {
    let lost_interpreter = inner.mode == SessionMode::Interpreter;
    let peer = inner.transport.identity().clone();
    inner.link = LinkState::Reconnecting;
    tracing::warn!("Connection to {} lost, reconnecting", peer);

    match establish(inner, settings).await {
        Ok(attempts) => {
            inner.reconnects += 1;
            if lost_interpreter {
                tracing::warn!(
                    "Reconnected to {} after {} attempt(s); interpreter state was lost, session is back in shell mode",
                    peer,
                    attempts
                );
            } else {
                tracing::info!("Reconnected to {} after {} attempt(s)", peer, attempts);
            }
            Ok(())
        }
        Err(e) => {
            inner.link = LinkState::Failed;
            inner.mode = SessionMode::Unknown;
            tracing::error!("Giving up on {}: {}", peer, e);
            Err(SessionError::SessionFailed {
                attempts: settings.retry.attempts(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;
    use crate::transport::RetryPolicy;
    use std::time::Duration;

    fn settings() -> SessionSettings {
        SessionSettings {
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            settle: Duration::ZERO,
            ..SessionSettings::default()
        }
    }

    #[tokio::test]
    async fn test_recover_resets_to_shell() {
        let transport = ScriptedTransport::python_robot();
        let mut inner = SessionInner::new(transport);
        inner.mode = SessionMode::Interpreter;
        inner.link = LinkState::Connected;

        recover(&mut inner, &settings()).await.unwrap();
        assert_eq!(inner.mode, SessionMode::Shell);
        assert_eq!(inner.link, LinkState::Connected);
        assert_eq!(inner.reconnects, 1);
    }

    #[tokio::test]
    async fn test_recover_failure_marks_failed() {
        let transport = ScriptedTransport::python_robot();
        transport.handle().fail_next_opens(10);
        let mut inner = SessionInner::new(transport);
        inner.mode = SessionMode::Shell;
        inner.link = LinkState::Connected;

        let err = recover(&mut inner, &settings()).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionFailed { attempts: 2 }));
        assert_eq!(inner.link, LinkState::Failed);
        assert_eq!(inner.mode, SessionMode::Unknown);
    }
}
