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

pub mod batch;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod robot;
pub mod session;
pub mod ssh;
pub mod sync;
pub mod transport;
pub mod utils;

pub use batch::{run_batch, BatchItem, BatchItemResult, BatchOptions};
pub use cli::Cli;
pub use config::Config;
pub use envelope::{EnvelopeStatus, ResultEnvelope};
pub use error::{ConfigError, RegistryError, SessionError, TransportError};
pub use registry::SessionRegistry;
pub use session::{
    CommandOutcome, ConnectionStatus, LinkState, OutcomeKind, Session, SessionMode,
    SessionSettings,
};
pub use transport::{RetryPolicy, SshTransport, Transport};
