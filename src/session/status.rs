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

use serde::Serialize;

use super::{LinkState, SessionMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub hostname: String,
    pub username: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub mode: SessionMode,
    pub link: LinkState,
    /// The transport itself reports the link as open.
    pub transport_active: bool,
    pub can_ping: bool,
    pub reconnects: u32,
}
