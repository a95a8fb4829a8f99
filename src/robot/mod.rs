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

//! Opentrons vocabulary on top of a session.
//!
//! Everything here only builds interpreter statements and sends them through
//! [`Session::execute`](crate::session::Session::execute); nothing bypasses
//! the mode checks or the prompt synchronizer.

mod config;
mod instrument;
mod location;
mod protocol;

pub use config::{InstrumentConfig, InstrumentKind, LabwareConfig, ModuleConfig, Mount, Slot};
pub use instrument::{
    Gripper, GripperAction, Instrument, InstrumentAction, Pipette, PipetteAction,
    DEFAULT_GRIP_FORCE,
};
pub use location::{Location, Offset, WellPosition};
pub use protocol::{Deck, DeckConfig, DeckTarget, ProtocolSetup, DEFAULT_API_VERSION};
