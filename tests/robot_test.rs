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

use otsh::robot::{
    Deck, DeckTarget, GripperAction, Instrument, InstrumentConfig, LabwareConfig, Location,
    PipetteAction, ProtocolSetup,
};
use otsh::session::{OutcomeKind, SessionMode};
use otsh::SessionError;

use common::connected_session;

fn ot2_deck() -> Deck {
    let mut deck = Deck::new(ProtocolSetup::simulated());
    deck.add_labware(LabwareConfig::new("tips", "opentrons_96_tiprack_300ul", "1").unwrap())
        .unwrap();
    deck.add_labware(LabwareConfig::new("plate", "corning_96_wellplate_360ul_flat", "2").unwrap())
        .unwrap();
    let p300 = InstrumentConfig::pipette("p300", "p300_single_gen2", "right")
        .unwrap()
        .with_tip_racks(["tips"])
        .unwrap();
    deck.add_instrument(Instrument::from_config(p300).unwrap())
        .unwrap();
    deck
}

#[tokio::test]
async fn test_deck_load_runs_setup_in_interpreter() {
    let (session, remote) = connected_session().await;
    let deck = ot2_deck();

    let results = deck.load(&session, Duration::from_millis(1)).await.unwrap();

    assert_eq!(results.len(), deck.setup_items().len());
    assert!(results.iter().all(|r| r.success), "{results:?}");
    assert_eq!(session.mode().await, SessionMode::Interpreter);
    let lines = remote.lines();
    assert!(lines
        .iter()
        .any(|l| l == "protocol = opentrons.simulate.get_protocol_api(\"2.21\")"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("p300 = protocol.load_instrument(")));
}

#[tokio::test]
async fn test_pipette_actions_are_sent_as_statements() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let deck = ot2_deck();
    let pipette = deck.instrument("p300").unwrap();

    let outcome = pipette
        .execute(&session, PipetteAction::PickUpTip { location: None })
        .await
        .unwrap();
    assert!(outcome.is_ok());

    pipette
        .execute(
            &session,
            PipetteAction::Aspirate {
                volume: 100.0,
                location: Location::bottom("plate", "A1", 1.0),
                rate: 1.0,
            },
        )
        .await
        .unwrap();

    let lines = remote.lines();
    assert!(lines.contains(&"p300.pick_up_tip()".to_string()));
    assert!(lines.contains(&"p300.aspirate(100, plate['A1'].bottom(1), rate=1)".to_string()));
}

#[tokio::test]
async fn test_invalid_action_is_not_sent() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let deck = ot2_deck();
    let pipette = deck.instrument("p300").unwrap();
    let sends = remote.send_count();

    let err = pipette
        .execute(&session, GripperAction::grip())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidCommand(_)));

    let err = pipette
        .execute(
            &session,
            PipetteAction::Mix {
                repetitions: 0,
                volume: 50.0,
                location: None,
                rate: 1.0,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidCommand(_)));
    assert_eq!(remote.send_count(), sends);
}

#[tokio::test]
async fn test_remote_failure_surfaces_as_interpreter_error() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    remote.reply_to(
        "p300.drop_tip()",
        "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\nRuntimeError: Cannot drop tip without a tip attached",
    );
    let deck = ot2_deck();

    let outcome = deck
        .instrument("p300")
        .unwrap()
        .execute(&session, PipetteAction::DropTip { location: None })
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::InterpreterError);
    assert!(outcome.detail.unwrap().contains("Cannot drop tip"));
}

#[tokio::test]
async fn test_protocol_calls() {
    let (session, remote) = connected_session().await;
    session.enter_interpreter().await.unwrap();
    let deck = ot2_deck();

    deck.home(&session).await.unwrap();
    deck.pause(&session, Some("Refill the reservoir")).await.unwrap();
    deck.resume(&session).await.unwrap();
    deck.delay(&session, Duration::from_secs(2), None)
        .await
        .unwrap();
    deck.move_labware(&session, "plate", &DeckTarget::Slot("5".parse().unwrap()), false)
        .await
        .unwrap();

    let lines = remote.lines();
    for expected in [
        "protocol.home()",
        "protocol.pause(\"Refill the reservoir\")",
        "protocol.resume()",
        "protocol.delay(seconds=2)",
        "protocol.move_labware(plate, \"5\", use_gripper=False)",
    ] {
        assert!(lines.iter().any(|l| l == expected), "missing {expected}");
    }
}
