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

use std::time::Duration;

use otsh::session::{Session, SessionSettings};
use otsh::transport::mock::{RemoteHandle, ScriptedTransport};
use otsh::transport::RetryPolicy;

/// Settings tuned for the in-memory transport.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(5)),
        command_timeout: Duration::from_secs(2),
        enter_timeout: Duration::from_secs(2),
        exit_timeout: Duration::from_secs(1),
        settle: Duration::ZERO,
        ..SessionSettings::default()
    }
}

/// A connected session to a scripted robot, plus a handle on the remote side.
pub async fn connected_session() -> (Session<ScriptedTransport>, RemoteHandle) {
    let transport = ScriptedTransport::python_robot();
    let remote = transport.handle();
    let session = Session::new(transport, fast_settings());
    session.connect().await.expect("connect to scripted robot");
    (session, remote)
}
