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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::ssh::StrictHostKeyChecking;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: SessionDefaults,

    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
}

/// Tunables shared by every session.
///
/// Durations are whole seconds for the user-facing timeouts and
/// milliseconds for the pacing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionDefaults {
    pub max_retries: u32,
    pub command_timeout: u64,
    pub connection_timeout: u64,
    pub retry_base_delay_ms: u64,
    /// Randomize backoff delays by up to a quarter.
    pub retry_jitter: bool,
    pub poll_interval_ms: u64,
    pub continuation_grace_ms: u64,
    pub settle_ms: u64,
    pub delay_between_ms: u64,
    pub interpreter_command: String,
    pub results_path: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            command_timeout: 30,
            connection_timeout: 10,
            retry_base_delay_ms: 1000,
            retry_jitter: true,
            poll_interval_ms: 100,
            continuation_grace_ms: 500,
            settle_ms: 1000,
            delay_between_ms: 500,
            interpreter_command: "python3".to_string(),
            results_path: "/tmp/otsh_result.json".to_string(),
        }
    }
}

/// One robot reachable under a symbolic alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub hostname: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_key_file")]
    pub key_file: Option<String>,

    #[serde(default)]
    pub password_file: Option<String>,

    #[serde(default)]
    pub use_agent: bool,

    #[serde(default)]
    pub strict_host_key_checking: StrictHostKeyChecking,
}

fn default_username() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_key_file() -> Option<String> {
    Some("~/.ssh/ot2_ssh_key".to_string())
}

impl HostConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: default_username(),
            port: default_port(),
            key_file: default_key_file(),
            password_file: None,
            use_agent: false,
            strict_host_key_checking: StrictHostKeyChecking::default(),
        }
    }
}

/// Who a session talks to. Kept across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostIdentity {
    pub alias: Option<String>,
    pub hostname: String,
    pub username: String,
    pub port: u16,
}

impl HostIdentity {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>, port: u16) -> Self {
        Self {
            alias: None,
            hostname: hostname.into(),
            username: username.into(),
            port,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 22 {
            write!(f, "{}@{}", self.username, self.hostname)
        } else {
            write!(f, "{}@{}:{}", self.username, self.hostname, self.port)
        }
    }
}
