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

use otsh::error::SessionError;
use otsh::session::{LinkState, OutcomeKind, SessionMode};

use common::connected_session;

#[tokio::test]
async fn test_connect_starts_in_shell() {
    let (session, remote) = connected_session().await;

    assert_eq!(session.mode().await, SessionMode::Shell);
    assert_eq!(session.link_state().await, LinkState::Connected);
    assert!(session.is_alive().await);
    assert_eq!(remote.open_calls(), 1);
    // The login banner is discarded, nothing is written
    assert_eq!(remote.send_count(), 0);
}

#[tokio::test]
async fn test_enter_interpreter_twice_sends_once() {
    let (session, remote) = connected_session().await;

    session.enter_interpreter().await.unwrap();
    assert_eq!(session.mode().await, SessionMode::Interpreter);
    assert!(remote.remote_in_python());

    let sends = remote.send_count();
    let written = remote.written();
    session.enter_interpreter().await.unwrap();
    assert_eq!(remote.send_count(), sends);
    assert_eq!(remote.written(), written);
}

#[tokio::test]
async fn test_leave_interpreter_returns_to_shell() {
    let (session, remote) = connected_session().await;

    session.enter_interpreter().await.unwrap();
    session.leave_interpreter().await.unwrap();
    assert_eq!(session.mode().await, SessionMode::Shell);
    assert!(!remote.remote_in_python());
}

#[tokio::test]
async fn test_wrong_mode_is_rejected_without_writing() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let sends = remote.send_count();

    let err = session
        .execute("ls -la", SessionMode::Shell, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::WrongMode {
            requested: SessionMode::Shell,
            current: SessionMode::Interpreter
        }
    ));
    assert_eq!(remote.send_count(), sends);

    session.leave_interpreter().await.unwrap();
    let sends = remote.send_count();
    let err = session
        .execute("print(1)", SessionMode::Interpreter, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::WrongMode { .. }));
    assert_eq!(remote.send_count(), sends);
}

#[tokio::test]
async fn test_interpreter_state_persists_between_statements() {
    let (session, _remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();

    for statement in ["x = 10", "y = 20"] {
        let outcome = session.run_python(statement, None).await.unwrap();
        assert!(outcome.is_ok(), "{statement}: {outcome:?}");
    }
    let outcome = session.run_python("print(x + y)", None).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Ok);
    assert!(outcome.text().contains("30"));
}

#[tokio::test]
async fn test_traceback_is_classified_and_not_retried() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let sends = remote.send_count();

    let outcome = session
        .run_python("raise ValueError('bad volume')", None)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::InterpreterError);
    let detail = outcome.detail.as_deref().unwrap();
    assert!(detail.contains("Traceback (most recent call last):"));
    assert!(detail.contains("ValueError: bad volume"));
    assert_eq!(remote.send_count(), sends + 1);
    assert_eq!(
        remote
            .lines()
            .iter()
            .filter(|l| l.contains("raise ValueError"))
            .count(),
        1
    );
    // The session is still usable afterwards
    assert!(session.run_python("print(1)", None).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shell_output_is_scanned_for_errors() {
    let (session, remote) = connected_session().await;
    remote.reply_to(
        "python3 -c",
        "Traceback (most recent call last):\r\n  File \"<string>\", line 1\r\nZeroDivisionError: division by zero",
    );

    let outcome = session
        .run_shell("python3 -c '1/0'", None)
        .await
        .unwrap();
    assert!(outcome.is_interpreter_error());
    assert_eq!(session.mode().await, SessionMode::Shell);
}

#[tokio::test]
async fn test_shell_command_output() {
    let (session, remote) = connected_session().await;
    remote.reply_to("hostname", "ot2-robot");

    let outcome = session.run_shell("hostname", None).await.unwrap();
    assert!(outcome.is_ok());
    assert_eq!(outcome.text(), "ot2-robot");
}

#[tokio::test]
async fn test_timeout_is_reported_not_retried() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    remote.hang_on("time.sleep");
    let sends = remote.send_count();

    let outcome = session
        .run_python(
            "time.sleep(600)",
            Some(std::time::Duration::from_millis(300)),
        )
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::TransportTimeout);
    assert!(outcome.is_transport_failure());
    assert_eq!(remote.send_count(), sends + 1);
    assert_eq!(remote.open_calls(), 1);
}

#[tokio::test]
async fn test_multiline_block_is_closed() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    remote.reply_to("for i in range(3)", "0\r\n1\r\n2");

    let outcome = session
        .run_python("for i in range(3):\n    print(i)", None)
        .await
        .unwrap();
    assert!(outcome.is_ok(), "{outcome:?}");
    assert!(outcome.text().contains('2'));
}

#[tokio::test]
async fn test_several_statements_pair_with_one_prompt() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();

    let code = "x = 41\nprint(x + 1)";
    let outcome = session.run_python(code, None).await.unwrap();
    assert!(outcome.is_ok(), "{outcome:?}");
    assert_eq!(outcome.command, code);
    assert_eq!(outcome.text(), "42");
    assert_eq!(remote.variable("x"), Some(41));

    // Written as one line, so one prompt closes it
    let sent: Vec<String> = remote
        .lines()
        .into_iter()
        .filter(|l| l.contains("x = 41"))
        .collect();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("exec(compile("));

    // Nothing left behind for the next command
    let next = session.run_python("print(x)", None).await.unwrap();
    assert_eq!(next.text(), "41");
}

#[tokio::test]
async fn test_error_in_later_statement_is_detected() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();

    let outcome = session
        .run_python("x = 1\nraise ValueError('boom')", None)
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::InterpreterError);
    assert!(outcome.text().contains("ValueError: boom"));
    assert_eq!(remote.variable("x"), Some(1));
    assert_eq!(session.mode().await, SessionMode::Interpreter);
}

#[tokio::test]
async fn test_ping_and_status() {
    let (session, _remote) = connected_session().await;

    let status = session.status().await;
    assert!(status.connected);
    assert!(status.transport_active);
    assert!(status.can_ping);
    assert_eq!(status.mode, SessionMode::Shell);
    assert_eq!(status.hostname, "ot2.mock");
    assert_eq!(status.reconnects, 0);

    // Pinging goes through the interpreter
    assert_eq!(session.mode().await, SessionMode::Interpreter);
    assert!(session.ping().await);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["link"], "connected");
    assert_eq!(json["mode"], "shell");
}

#[tokio::test]
async fn test_closed_session_rejects_commands() {
    let (session, remote) = connected_session().await;
    session.close().await.unwrap();
    assert!(!session.is_alive().await);
    assert!(!session.ping().await);

    let sends = remote.send_count();
    let err = session.run_shell("ls", None).await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert_eq!(remote.send_count(), sends);

    session.connect().await.unwrap();
    assert_eq!(session.mode().await, SessionMode::Shell);
}

#[tokio::test]
async fn test_concurrent_callers_do_not_interleave() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let session = std::sync::Arc::new(session);

    let mut tasks = Vec::new();
    for n in 0..5 {
        let session = std::sync::Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            session
                .run_python(&format!("print({n} + 100)"), None)
                .await
                .unwrap()
        }));
    }
    for (n, task) in tasks.into_iter().enumerate() {
        let outcome = task.await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.text(), (n + 100).to_string());
    }
    assert_eq!(remote.open_calls(), 1);
}
