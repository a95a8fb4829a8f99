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

//! Error taxonomy for sessions and their transport.
//!
//! Pre-flight rejections (wrong mode, failed session) and transport
//! failures are errors. A command that reached the remote side always
//! produces a [`CommandOutcome`](crate::session::CommandOutcome) instead,
//! so "my statement failed" never looks like "the network failed".

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionMode;

/// Failures of the raw byte channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {peer}: {reason}")]
    Connect { peer: String, reason: String },

    #[error("connection to {peer} timed out after {}s", .timeout.as_secs())]
    ConnectTimeout { peer: String, timeout: Duration },

    #[error("channel closed by the remote side")]
    Closed,

    #[error("transport is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Reasons a session refuses or fails an operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not connected")]
    NotConnected,

    #[error("session failed after exhausting {attempts} reconnect attempts; connect again to recover")]
    SessionFailed { attempts: u32 },

    #[error("wrong mode: command targets {requested} but the session is in {current}")]
    WrongMode {
        requested: SessionMode,
        current: SessionMode,
    },

    #[error("session mode is unknown; detect the mode or reconnect before sending commands")]
    ModeUnknown,

    #[error("failed to switch to {target} mode within {}s", .timeout.as_secs())]
    ModeSwitch {
        target: SessionMode,
        timeout: Duration,
        output: String,
    },

    #[error("invalid robot command: {0}")]
    InvalidCommand(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Validation failures for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host '{alias}': {reason}")]
    InvalidHost { alias: String, reason: String },

    #[error("unknown host alias '{alias}'")]
    UnknownHost { alias: String },

    #[error("'{value}' is not a valid Python identifier for {field}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("'{value}' is not a deck slot (expected 1-12 or A1-D4)")]
    InvalidSlot { value: String },

    #[error("mount must be 'left' or 'right', got '{value}'")]
    InvalidMount { value: String },

    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
        value: String,
    },

    #[error("'{value}' is not a well name (expected a row A-P and a column 1-24)")]
    InvalidWell { value: String },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("'{nickname}' is already loaded on the deck")]
    Duplicate { nickname: String },

    #[error("slot {slot} is already taken by '{occupant}'")]
    SlotOccupied { slot: String, occupant: String },

    #[error("nothing named '{nickname}' is loaded on the deck")]
    UnknownNickname { nickname: String },
}

/// Lifecycle errors of the session registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a session named '{alias}' already exists")]
    AlreadyExists { alias: String },

    #[error("no session named '{alias}'")]
    NotFound { alias: String },
}
