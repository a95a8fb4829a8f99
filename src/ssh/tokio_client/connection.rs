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

//! SSH connection establishment and the interactive shell channel.

use russh::client::{Config, Handle, Handler, Msg};
use russh::{Channel, Pty};
use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use super::authentication::{AuthMethod, ServerCheckMethod};
use crate::ssh::known_hosts::accept_new_host_key;

/// Terminal type requested for the interactive shell.
pub const DEFAULT_TERM: &str = "xterm";

/// An authenticated SSH connection to a robot.
#[derive(Clone)]
pub struct Client {
    connection_handle: Arc<Handle<ClientHandler>>,
    username: String,
    address: SocketAddr,
}

impl Client {
    /// Resolve `hostname:port`, connect to the first reachable address, then authenticate.
    pub async fn connect(
        hostname: &str,
        port: u16,
        username: &str,
        auth: AuthMethod,
        server_check: ServerCheckMethod,
        config: Config,
    ) -> Result<Self, super::Error> {
        let config = Arc::new(config);

        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host((hostname, port))
            .await
            .map_err(super::Error::AddressInvalid)?
            .collect();

        let mut connect_res = Err(super::Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(hostname.to_string(), socket_addr, server_check.clone());
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok((socket_addr, h));
                    break;
                }
                Err(e) => {
                    tracing::debug!("Connection to {} failed: {}", socket_addr, e);
                    connect_res = Err(e);
                }
            }
        }
        let (address, mut handle) = connect_res?;

        super::authentication::authenticate(&mut handle, username, auth).await?;

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: username.to_string(),
            address,
        })
    }

    /// Open a session channel with a PTY and a login shell on it.
    ///
    /// The PTY gives the remote side a terminal, so both the login shell and
    /// the Python REPL print their prompts.
    pub async fn open_shell(&self, width: u32, height: u32) -> Result<Channel<Msg>, super::Error> {
        let channel = self.connection_handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                DEFAULT_TERM,
                width,
                height,
                0,
                0,
                &shell_terminal_modes(),
            )
            .await?;
        channel.request_shell(false).await?;
        Ok(channel)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .finish()
    }
}

/// Terminal modes for a non-interactive consumer of a PTY.
///
/// Echo stays on because the REPL continuation prompts are only printed
/// when the terminal echoes, and output post-processing (`OPOST`) stays on
/// so lines end in `\r\n` like a real terminal.
fn shell_terminal_modes() -> Vec<(Pty, u32)> {
    vec![
        (Pty::VINTR, 0x03),
        (Pty::VEOF, 0x04),
        (Pty::ICRNL, 1),
        (Pty::IXON, 0),
        (Pty::ISIG, 1),
        (Pty::ICANON, 1),
        (Pty::ECHO, 1),
        (Pty::OPOST, 1),
        (Pty::ONLCR, 1),
        (Pty::TTY_OP_ISPEED, 38400),
        (Pty::TTY_OP_OSPEED, 38400),
    ]
}

/// Host key verification for one connection attempt.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => {
                russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.host.port(),
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| super::Error::ServerCheckFailed)
            }
            ServerCheckMethod::DefaultKnownHostsFile => russh::keys::check_known_hosts(
                &self.hostname,
                self.host.port(),
                server_public_key,
            )
            .map_err(|_| super::Error::ServerCheckFailed),
            ServerCheckMethod::AcceptNew(known_hosts_path) => accept_new_host_key(
                &self.hostname,
                self.host.port(),
                server_public_key,
                known_hosts_path,
            )
            .map_err(|_| super::Error::ServerCheckFailed),
        }
    }
}
