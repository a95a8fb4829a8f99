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

//! A persistent prompt-driven session over one transport.
//!
//! [`Session`] owns the transport, tracks whether the remote side is in
//! the login shell or the Python interpreter, and runs one command at a
//! time: every exchange holds the session lock from the stale-output drain
//! through the prompt match and classification, including any reconnect
//! and retry it triggers.

mod mode;
mod outcome;
mod reconnect;
mod status;

use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::Mutex;

pub use mode::SessionMode;
pub use outcome::{CommandOutcome, OutcomeKind};
pub use reconnect::LinkState;
pub use status::ConnectionStatus;

use crate::config::{HostIdentity, SessionDefaults};
use crate::envelope::exec_statement;
use crate::error::SessionError;
use crate::sync::{self, exchange, PromptMarkers, SyncFailure, SyncOptions};
use crate::transport::{RetryPolicy, Transport};

/// Timeouts and pacing for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub retry: RetryPolicy,
    /// Default deadline for one command.
    pub command_timeout: Duration,
    /// Deadline for the interpreter prompt after the launch command.
    pub enter_timeout: Duration,
    /// Deadline for the shell prompt after the exit command.
    pub exit_timeout: Duration,
    pub ping_timeout: Duration,
    /// Pause after the shell opens, before the login banner is discarded.
    pub settle: Duration,
    pub sync: SyncOptions,
    pub interpreter_command: String,
    pub exit_command: String,
    /// Remote file the result envelope is written to.
    pub results_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionDefaults::default())
    }
}

impl From<&SessionDefaults> for SessionSettings {
    fn from(defaults: &SessionDefaults) -> Self {
        Self {
            retry: RetryPolicy::new(
                defaults.max_retries,
                Duration::from_millis(defaults.retry_base_delay_ms),
            )
            .with_jitter(defaults.retry_jitter),
            command_timeout: Duration::from_secs(defaults.command_timeout),
            enter_timeout: Duration::from_secs(10),
            exit_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(defaults.settle_ms),
            sync: SyncOptions {
                poll_interval: Duration::from_millis(defaults.poll_interval_ms),
                continuation_grace: Duration::from_millis(defaults.continuation_grace_ms),
                ..SyncOptions::default()
            },
            interpreter_command: defaults.interpreter_command.clone(),
            exit_command: "exit()".to_string(),
            results_path: defaults.results_path.clone(),
        }
    }
}

/// Everything guarded by the session lock.
pub(crate) struct SessionInner<T> {
    transport: T,
    mode: SessionMode,
    link: LinkState,
    reconnects: u32,
}

impl<T> SessionInner<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            mode: SessionMode::Unknown,
            link: LinkState::Disconnected,
            reconnects: 0,
        }
    }
}

pub struct Session<T: Transport> {
    identity: HostIdentity,
    settings: SessionSettings,
    inner: Mutex<SessionInner<T>>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        Self {
            identity: transport.identity().clone(),
            settings,
            inner: Mutex::new(SessionInner::new(transport)),
        }
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Open the link (retrying with backoff) and start in shell mode.
    ///
    /// This is also the only way out of [`LinkState::Failed`].
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.link == LinkState::Connected && inner.transport.is_alive() {
            tracing::debug!("Already connected to {}", self.identity);
            return Ok(());
        }
        match reconnect::establish(&mut inner, &self.settings).await {
            Ok(_) => {
                tracing::info!("Session to {} ready in shell mode", self.identity);
                Ok(())
            }
            Err(e) => {
                inner.link = LinkState::Disconnected;
                inner.mode = SessionMode::Unknown;
                Err(e)
            }
        }
    }

    /// Leave the interpreter if needed and close the link.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.mode == SessionMode::Interpreter && inner.transport.is_alive() {
            if let Err(e) = self.switch_mode(&mut inner, SessionMode::Shell).await {
                tracing::debug!("Could not leave the interpreter before closing: {}", e);
            }
        }
        let result = inner.transport.close().await;
        inner.mode = SessionMode::Unknown;
        inner.link = LinkState::Disconnected;
        tracing::info!("Session to {} closed", self.identity);
        result.map_err(SessionError::from)
    }

    /// Liveness of the link itself, not just the last known state.
    pub async fn is_alive(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.link == LinkState::Connected && inner.transport.is_alive()
    }

    pub async fn mode(&self) -> SessionMode {
        self.inner.lock().await.mode
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.lock().await.link
    }

    /// How many times the link has been rebuilt after a failure.
    pub async fn reconnect_count(&self) -> u32 {
        self.inner.lock().await.reconnects
    }

    /// Switch to the interpreter. No-op when already there.
    pub async fn enter_interpreter(&self) -> Result<(), SessionError> {
        self.ensure_mode(SessionMode::Interpreter).await
    }

    /// Switch back to the shell. No-op when already there.
    pub async fn leave_interpreter(&self) -> Result<(), SessionError> {
        self.ensure_mode(SessionMode::Shell).await
    }

    /// Put the session in `target` mode, sending nothing if it already is.
    pub async fn ensure_mode(&self, target: SessionMode) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        Self::check_link(&inner, &self.settings)?;
        self.switch_mode(&mut inner, target).await.map(|_| ())
    }

    /// Send a bare newline and read the mode off the prompt that comes back.
    ///
    /// Recovers from [`SessionMode::Unknown`] without reconnecting.
    pub async fn detect_mode(&self) -> Result<SessionMode, SessionError> {
        let mut inner = self.inner.lock().await;
        Self::check_link(&inner, &self.settings)?;

        sync::drain(&mut inner.transport, self.settings.sync.drain_wait).await?;
        inner.transport.send(b"\n").await?;

        let deadline = tokio::time::Instant::now() + self.settings.exit_timeout;
        let mut raw = Vec::new();
        let mut detected = SessionMode::Unknown;
        while tokio::time::Instant::now() < deadline {
            if let Some(chunk) = inner.transport.recv(self.settings.sync.poll_interval).await? {
                raw.extend_from_slice(&chunk);
                detected = sync::detect_mode(&String::from_utf8_lossy(&raw));
                if detected.is_known() {
                    break;
                }
            }
        }

        inner.mode = detected;
        if detected.is_known() {
            tracing::info!("Detected {} mode on {}", detected, self.identity);
        } else {
            tracing::warn!(
                "Could not detect session mode on {}, output: {:?}",
                self.identity,
                String::from_utf8_lossy(&raw)
            );
        }
        Ok(detected)
    }

    /// Run one command in `mode`.
    ///
    /// Rejected without touching the transport when the session is not
    /// connected, has failed, or is in another mode. Once the command is
    /// written, every ending is a [`CommandOutcome`]. Link failures during
    /// shell commands are retried after reconnecting; interpreter commands
    /// are never re-issued, since their effects may not be repeatable.
    ///
    /// Interpreter text holding several top-level statements is sent as a
    /// single `exec` line so that exactly one prompt closes the exchange.
    pub async fn execute(
        &self,
        command: &str,
        mode: SessionMode,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome, SessionError> {
        let timeout = timeout.unwrap_or(self.settings.command_timeout);
        let mut inner = self.inner.lock().await;
        Self::check_link(&inner, &self.settings)?;

        let mut recovered_from = None;
        if !inner.transport.is_alive() {
            recovered_from = Some(inner.mode);
            reconnect::recover(&mut inner, &self.settings).await?;
        }

        match inner.mode {
            SessionMode::Unknown => return Err(SessionError::ModeUnknown),
            current if current != mode => {
                if recovered_from == Some(SessionMode::Interpreter)
                    && mode == SessionMode::Interpreter
                {
                    return Ok(CommandOutcome::failed(
                        OutcomeKind::SessionReset,
                        command,
                        mode,
                        String::new(),
                        reset_detail(),
                        Duration::ZERO,
                    ));
                }
                return Err(SessionError::WrongMode {
                    requested: mode,
                    current,
                });
            }
            _ => {}
        }

        let markers = PromptMarkers::for_mode(mode);
        let wire: Cow<'_, str> =
            if mode == SessionMode::Interpreter && sync::top_level_statements(command) > 1 {
                tracing::debug!("Sending several statements to {} as one exec", self.identity);
                Cow::Owned(exec_statement(command))
            } else {
                Cow::Borrowed(command)
            };
        let mut attempt = 1;
        loop {
            let result = exchange(
                &mut inner.transport,
                &wire,
                &markers,
                timeout,
                &self.settings.sync,
            )
            .await;

            match result {
                Ok(exchange) => {
                    let outcome =
                        CommandOutcome::completed(command, mode, exchange.output, exchange.elapsed)
                            .with_sent(&wire);
                    if outcome.is_interpreter_error() {
                        tracing::debug!("Command raised on {}:\n{}", self.identity, outcome.output);
                    }
                    return Ok(outcome);
                }
                Err(SyncFailure::Timeout { output, elapsed }) => {
                    tracing::warn!(
                        "No {} prompt from {} within {:?}",
                        mode,
                        self.identity,
                        timeout
                    );
                    return Ok(CommandOutcome::failed(
                        OutcomeKind::TransportTimeout,
                        command,
                        mode,
                        output,
                        format!("no {mode} prompt within {}s", timeout.as_secs_f64()),
                        elapsed,
                    )
                    .with_sent(&wire));
                }
                Err(SyncFailure::Transport { error, output }) => {
                    tracing::warn!(
                        "Exchange with {} failed (attempt {}): {}",
                        self.identity,
                        attempt,
                        error
                    );
                    if let Err(e) = reconnect::recover(&mut inner, &self.settings).await {
                        return Ok(CommandOutcome::failed(
                            OutcomeKind::TransportError,
                            command,
                            mode,
                            output,
                            format!("{error}; {e}"),
                            Duration::ZERO,
                        ));
                    }
                    if mode == SessionMode::Interpreter {
                        return Ok(CommandOutcome::failed(
                            OutcomeKind::SessionReset,
                            command,
                            mode,
                            output,
                            reset_detail(),
                            Duration::ZERO,
                        ));
                    }
                    if attempt >= self.settings.retry.attempts() {
                        inner.link = LinkState::Failed;
                        inner.mode = SessionMode::Unknown;
                        tracing::error!(
                            "Command to {} failed after {} attempts",
                            self.identity,
                            attempt
                        );
                        return Ok(CommandOutcome::failed(
                            OutcomeKind::TransportError,
                            command,
                            mode,
                            output,
                            format!("{error} (gave up after {attempt} attempts)"),
                            Duration::ZERO,
                        ));
                    }
                    tokio::time::sleep(self.settings.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run a shell command.
    pub async fn run_shell(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome, SessionError> {
        self.execute(command, SessionMode::Shell, timeout).await
    }

    /// Run an interpreter statement.
    pub async fn run_python(
        &self,
        code: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome, SessionError> {
        self.execute(code, SessionMode::Interpreter, timeout).await
    }

    /// Round trip through the interpreter. Enters it when needed.
    pub async fn ping(&self) -> bool {
        if self.ensure_mode(SessionMode::Interpreter).await.is_err() {
            return false;
        }
        match self
            .execute(
                "print('ping')",
                SessionMode::Interpreter,
                Some(self.settings.ping_timeout),
            )
            .await
        {
            Ok(outcome) => outcome.is_ok() && outcome.text().contains("ping"),
            Err(_) => false,
        }
    }

    /// Snapshot of the link. `mode` is taken before the ping, which may
    /// leave the session in interpreter mode.
    pub async fn status(&self) -> ConnectionStatus {
        let (link, mode, transport_active, reconnects) = {
            let inner = self.inner.lock().await;
            (
                inner.link,
                inner.mode,
                inner.transport.is_alive(),
                inner.reconnects,
            )
        };
        let connected = link == LinkState::Connected;
        let can_ping = connected && transport_active && self.ping().await;
        ConnectionStatus {
            connected,
            hostname: self.identity.hostname.clone(),
            username: self.identity.username.clone(),
            port: self.identity.port,
            alias: self.identity.alias.clone(),
            mode,
            link,
            transport_active,
            can_ping,
            reconnects,
        }
    }

    fn check_link(inner: &SessionInner<T>, settings: &SessionSettings) -> Result<(), SessionError> {
        match inner.link {
            LinkState::Connected => Ok(()),
            LinkState::Failed => Err(SessionError::SessionFailed {
                attempts: settings.retry.attempts(),
            }),
            LinkState::Disconnected | LinkState::Reconnecting => Err(SessionError::NotConnected),
        }
    }

    /// Drive the mode handshake. Returns whether anything was sent.
    async fn switch_mode(
        &self,
        inner: &mut SessionInner<T>,
        target: SessionMode,
    ) -> Result<bool, SessionError> {
        if inner.mode == target {
            return Ok(false);
        }
        let (command, timeout) = match (inner.mode, target) {
            (SessionMode::Unknown, _) | (_, SessionMode::Unknown) => {
                return Err(SessionError::ModeUnknown)
            }
            (_, SessionMode::Interpreter) => (
                self.settings.interpreter_command.as_str(),
                self.settings.enter_timeout,
            ),
            (_, SessionMode::Shell) => (self.settings.exit_command.as_str(), self.settings.exit_timeout),
        };

        tracing::info!("Switching {} to {} mode", self.identity, target);
        let markers = PromptMarkers::for_mode(target);
        match exchange(&mut inner.transport, command, &markers, timeout, &self.settings.sync).await {
            Ok(_) => {
                inner.mode = target;
                tracing::info!("{} is in {} mode", self.identity, target);
                Ok(true)
            }
            Err(SyncFailure::Timeout { output, .. }) => {
                // The command went out; the remote side could be in either mode now.
                inner.mode = SessionMode::Unknown;
                tracing::error!("Failed to switch {} to {} mode", self.identity, target);
                Err(SessionError::ModeSwitch {
                    target,
                    timeout,
                    output,
                })
            }
            Err(SyncFailure::Transport { error, .. }) => {
                inner.mode = SessionMode::Unknown;
                Err(SessionError::Transport(error))
            }
        }
    }
}

fn reset_detail() -> String {
    "connection was re-established; interpreter state was lost and the session is back in shell mode"
        .to_string()
}
