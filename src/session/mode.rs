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

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating state of the remote side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Login shell
    Shell,
    /// Python REPL started from the shell
    Interpreter,
    /// Not connected yet, or the last mode switch could not be confirmed
    #[default]
    Unknown,
}

impl SessionMode {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shell => "shell",
            Self::Interpreter => "interpreter",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shell" | "sh" => Ok(Self::Shell),
            "interpreter" | "python" | "py" => Ok(Self::Interpreter),
            other => Err(format!("unknown mode '{other}' (expected shell or python)")),
        }
    }
}
