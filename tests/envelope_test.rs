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

use otsh::envelope::{read_back_statement, EnvelopeStatus};

use common::connected_session;

#[tokio::test]
async fn test_enveloped_success() {
    let (session, remote) = connected_session().await;
    let path = session.settings().results_path.clone();
    remote.reply_to(
        &read_back_statement(&path),
        r#"<<OTSH>>{"status": "success", "data": {"volume": 150}, "error": null, "traceback": null}<<END>>"#,
    );

    let envelope = session
        .execute_enveloped("volume = 150", Some("{'volume': volume}"), None)
        .await
        .unwrap();

    assert!(envelope.is_success());
    assert_eq!(envelope.data.unwrap()["volume"], 150);
    let lines = remote.lines();
    assert!(lines.iter().any(|l| l.starts_with("exec(compile(") && l.contains(&path)));
}

#[tokio::test]
async fn test_enveloped_remote_exception() {
    let (session, remote) = connected_session().await;
    let path = session.settings().results_path.clone();
    remote.reply_to(
        &read_back_statement(&path),
        r#"<<OTSH>>{"status": "error", "data": null, "error": "no tip attached", "traceback": "Traceback (most recent call last):\n  File \"<otsh>\", line 1\nRuntimeError: no tip attached"}<<END>>"#,
    );

    let envelope = session
        .execute_enveloped("p300.aspirate(50)", None, None)
        .await
        .unwrap();

    assert_eq!(envelope.status, EnvelopeStatus::Error);
    assert_eq!(envelope.error.as_deref(), Some("no tip attached"));
    assert!(envelope.traceback.unwrap().contains("RuntimeError"));
}

#[tokio::test]
async fn test_unreadable_results_fall_back() {
    let (session, remote) = connected_session().await;
    let path = session.settings().results_path.clone();
    remote.reply_to(&read_back_statement(&path), "<<OTSH>>not json<<END>>");

    let envelope = session.execute_enveloped("x = 1", None, None).await.unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Error);
    assert!(envelope
        .error
        .unwrap()
        .starts_with("Failed to parse results"));
}
