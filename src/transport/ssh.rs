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

//! SSH transport: one PTY-backed login shell over a russh connection.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use std::time::Duration;
use zeroize::Zeroizing;

use super::Transport;
use crate::config::{Config, HostIdentity};
use crate::error::TransportError;
use crate::ssh::{get_check_method, AuthMethod, Client, ServerCheckMethod};

/// Connection knobs for [`SshTransport`].
#[derive(Debug, Clone)]
pub struct SshTransportOptions {
    pub connection_timeout: Duration,
    pub keepalive_interval: Duration,
    pub pty_width: u32,
    pub pty_height: u32,
}

impl Default for SshTransportOptions {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            // Wide enough that the REPL does not wrap echoed statements.
            pty_width: 512,
            pty_height: 50,
        }
    }
}

pub struct SshTransport {
    identity: HostIdentity,
    auth: AuthMethod,
    server_check: ServerCheckMethod,
    options: SshTransportOptions,
    client: Option<Client>,
    channel: Option<Channel<Msg>>,
    channel_open: bool,
}

impl SshTransport {
    pub fn new(
        identity: HostIdentity,
        auth: AuthMethod,
        server_check: ServerCheckMethod,
        options: SshTransportOptions,
    ) -> Self {
        Self {
            identity,
            auth,
            server_check,
            options,
            client: None,
            channel: None,
            channel_open: false,
        }
    }

    /// Build a transport for a configured host alias.
    pub async fn from_config(
        config: &Config,
        alias: &str,
        explicit_secret: Option<Zeroizing<String>>,
        prompt_for_secret: bool,
    ) -> anyhow::Result<Self> {
        let host = config.host(alias)?;
        let identity = config.identity(alias)?;
        let secret = host
            .resolve_secret(explicit_secret, prompt_for_secret)
            .await?;
        let auth = host.auth_method(secret)?;
        let options = SshTransportOptions {
            connection_timeout: Duration::from_secs(config.defaults.connection_timeout),
            ..SshTransportOptions::default()
        };
        Ok(Self::new(
            identity,
            auth,
            get_check_method(host.strict_host_key_checking),
            options,
        ))
    }

    fn mark_closed(&mut self) {
        if self.channel_open {
            tracing::debug!("Channel to {} closed", self.identity);
        }
        self.channel_open = false;
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let peer = self.identity.to_string();
        let config = russh::client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(self.options.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        };

        let connect = Client::connect(
            &self.identity.hostname,
            self.identity.port,
            &self.identity.username,
            self.auth.clone(),
            self.server_check.clone(),
            config,
        );
        let client = match tokio::time::timeout(self.options.connection_timeout, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    peer,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    peer,
                    timeout: self.options.connection_timeout,
                })
            }
        };

        let channel = client
            .open_shell(self.options.pty_width, self.options.pty_height)
            .await
            .map_err(|e| TransportError::Connect {
                peer: peer.clone(),
                reason: format!("failed to start shell: {e}"),
            })?;

        tracing::info!("SSH connection established to {}", peer);
        self.client = Some(client);
        self.channel = Some(channel);
        self.channel_open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.channel_open = false;
        if let Some(channel) = self.channel.take() {
            let _ = channel.eof().await;
            let _ = channel.close().await;
        }
        if let Some(client) = self.client.take() {
            if !client.is_closed() {
                if let Err(e) = client.disconnect().await {
                    tracing::debug!("Error while disconnecting from {}: {}", self.identity, e);
                }
            }
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.channel_open && self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let Some(channel) = self.channel.as_ref() else {
            return Err(TransportError::NotOpen);
        };
        let result = channel.data(data).await;
        if let Err(e) = result {
            self.mark_closed();
            return Err(TransportError::Ssh(e));
        }
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(TransportError::NotOpen);
        };
        let msg = match tokio::time::timeout(wait, channel.wait()).await {
            Err(_) => return Ok(None),
            Ok(msg) => msg,
        };
        match msg {
            Some(ChannelMsg::Data { ref data }) => Ok(Some(data.to_vec())),
            Some(ChannelMsg::ExtendedData { ref data, .. }) => Ok(Some(data.to_vec())),
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                tracing::debug!("Remote shell exited with status {}", exit_status);
                Ok(None)
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                self.mark_closed();
                Err(TransportError::Closed)
            }
            Some(_) => Ok(None),
        }
    }

    fn identity(&self) -> &HostIdentity {
        &self.identity
    }
}
