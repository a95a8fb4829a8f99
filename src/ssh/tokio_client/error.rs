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

//! Errors raised while establishing the russh client connection.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Address could not be resolved: {0}")]
    AddressInvalid(#[source] io::Error),

    #[error("Private key could not be loaded: {0}")]
    KeyInvalid(#[source] russh::keys::Error),

    #[error("Server host key verification failed")]
    ServerCheckFailed,

    #[error("Password authentication was rejected")]
    PasswordWrong,

    #[error("Public key authentication was rejected")]
    KeyAuthFailed,

    #[error("Failed to connect to the SSH agent")]
    AgentConnectionFailed,

    #[error("SSH agent holds no identities")]
    AgentNoIdentities,

    #[error("SSH agent could not authenticate with any identity")]
    AgentAuthenticationFailed,

    #[error("SSH protocol error: {0}")]
    SshError(#[from] russh::Error),
}
