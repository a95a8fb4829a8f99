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

mod common;

use std::time::Duration;

use otsh::error::SessionError;
use otsh::session::{LinkState, OutcomeKind, Session, SessionMode, SessionSettings};
use otsh::transport::mock::ScriptedTransport;
use otsh::transport::RetryPolicy;

use common::{connected_session, fast_settings};

#[tokio::test]
async fn test_drop_during_interpreter_exchange_resets_session() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    session.run_python("x = 10", None).await.unwrap();
    assert_eq!(remote.variable("x"), Some(10));

    remote.drop_on("y = 20");
    let outcome = session.run_python("y = 20", None).await.unwrap();

    assert_eq!(outcome.kind, OutcomeKind::SessionReset);
    assert!(outcome.is_transport_failure());
    assert_eq!(session.mode().await, SessionMode::Shell);
    assert_eq!(session.link_state().await, LinkState::Connected);
    assert_eq!(session.reconnect_count().await, 1);
    assert_eq!(remote.open_calls(), 2);
    // The statement is not re-issued on the new link
    assert_eq!(
        remote.lines().iter().filter(|l| l.as_str() == "y = 20").count(),
        1
    );

    // Earlier bindings are gone on the new interpreter
    session.enter_interpreter().await.unwrap();
    let outcome = session.run_python("print(x)", None).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::InterpreterError);
    assert!(outcome.detail.unwrap().contains("NameError"));
}

#[tokio::test]
async fn test_drop_between_commands_is_detected_before_sending() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    remote.drop_link();
    let sends = remote.send_count();

    let outcome = session.run_python("print(1)", None).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::SessionReset);
    assert_eq!(session.mode().await, SessionMode::Shell);
    // Nothing was written to the new link
    assert_eq!(remote.send_count(), sends);
}

#[tokio::test]
async fn test_shell_command_is_retried_after_reconnect() {
    let (session, remote) = connected_session().await;
    remote.reply_to("uptime", "up 3 days");
    remote.drop_on("uptime");

    let outcome = session.run_shell("uptime", None).await.unwrap();
    assert!(outcome.is_ok(), "{outcome:?}");
    assert_eq!(outcome.text(), "up 3 days");
    assert_eq!(session.reconnect_count().await, 1);
    assert_eq!(
        remote.lines().iter().filter(|l| l.as_str() == "uptime").count(),
        2
    );
}

#[tokio::test]
async fn test_failed_reconnect_marks_session_failed() {
    let (session, remote) = connected_session().await;
    remote.drop_link();
    remote.fail_next_opens(10);

    let err = session.run_shell("ls", None).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionFailed { attempts: 3 }));
    assert_eq!(session.link_state().await, LinkState::Failed);
    assert_eq!(session.mode().await, SessionMode::Unknown);

    // Fails fast without touching the transport
    let opens = remote.open_calls();
    let err = session.run_shell("ls", None).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionFailed { .. }));
    assert_eq!(remote.open_calls(), opens);

    // An explicit connect recovers
    remote.fail_next_opens(0);
    session.connect().await.unwrap();
    assert_eq!(session.link_state().await, LinkState::Connected);
    assert!(session.run_shell("ls", None).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_failed_reconnect_mid_exchange_is_an_outcome() {
    let (session, remote) = connected_session().await;
    remote.drop_on("reboot-check");
    remote.fail_next_opens(10);

    let outcome = session.run_shell("reboot-check", None).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::TransportError);
    assert_eq!(session.link_state().await, LinkState::Failed);
}

#[tokio::test]
async fn test_connect_retries_with_backoff() {
    let mut transport = ScriptedTransport::python_robot();
    transport.fail_next_opens(2);
    let remote = transport.handle();
    let session = Session::new(transport, fast_settings());

    session.connect().await.unwrap();
    assert_eq!(remote.open_calls(), 3);
    assert_eq!(session.mode().await, SessionMode::Shell);
}

#[tokio::test]
async fn test_connect_gives_up_after_max_retries() {
    let mut transport = ScriptedTransport::python_robot();
    transport.fail_next_opens(5);
    let remote = transport.handle();
    let settings = SessionSettings {
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        ..fast_settings()
    };
    let session = Session::new(transport, settings);

    assert!(session.connect().await.is_err());
    assert_eq!(remote.open_calls(), 2);
    assert_eq!(session.link_state().await, LinkState::Disconnected);
}
