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

//! Instruments as a closed set of variants, each turning actions into
//! interpreter statements.

use serde::{Deserialize, Serialize};

use super::config::{InstrumentConfig, InstrumentKind, Mount};
use super::location::Location;
use crate::error::{ConfigError, SessionError};
use crate::session::{CommandOutcome, Session, SessionMode};
use crate::transport::Transport;

pub const DEFAULT_GRIP_FORCE: f64 = 50.0;

fn default_rate() -> f64 {
    1.0
}

fn default_grip_force() -> f64 {
    DEFAULT_GRIP_FORCE
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            constraint: "a positive number",
            value: value.to_string(),
        })
    }
}

fn check_location(location: Option<&Location>) -> Result<(), ConfigError> {
    location.map_or(Ok(()), Location::validate)
}

fn optional_location(location: Option<&Location>) -> String {
    location.map(Location::to_python).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PipetteAction {
    PickUpTip {
        #[serde(default)]
        location: Option<Location>,
    },
    DropTip {
        #[serde(default)]
        location: Option<Location>,
    },
    ReturnTip,
    Aspirate {
        volume: f64,
        location: Location,
        #[serde(default = "default_rate")]
        rate: f64,
    },
    Dispense {
        volume: f64,
        location: Location,
        #[serde(default = "default_rate")]
        rate: f64,
    },
    Mix {
        repetitions: u32,
        volume: f64,
        #[serde(default)]
        location: Option<Location>,
        #[serde(default = "default_rate")]
        rate: f64,
    },
    BlowOut {
        #[serde(default)]
        location: Option<Location>,
    },
    MoveTo {
        location: Location,
    },
    Home,
}

impl PipetteAction {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::PickUpTip { location } | Self::DropTip { location } | Self::BlowOut { location } => {
                check_location(location.as_ref())
            }
            Self::Aspirate {
                volume,
                location,
                rate,
            }
            | Self::Dispense {
                volume,
                location,
                rate,
            } => {
                check_positive("volume", *volume)?;
                check_positive("rate", *rate)?;
                location.validate()
            }
            Self::Mix {
                repetitions,
                volume,
                location,
                rate,
            } => {
                if *repetitions == 0 {
                    return Err(ConfigError::OutOfRange {
                        field: "repetitions",
                        constraint: "at least 1",
                        value: repetitions.to_string(),
                    });
                }
                check_positive("volume", *volume)?;
                check_positive("rate", *rate)?;
                check_location(location.as_ref())
            }
            Self::MoveTo { location } => location.validate(),
            Self::ReturnTip | Self::Home => Ok(()),
        }
    }

    fn call(&self) -> String {
        match self {
            Self::PickUpTip { location } => {
                format!("pick_up_tip({})", optional_location(location.as_ref()))
            }
            Self::DropTip { location } => {
                format!("drop_tip({})", optional_location(location.as_ref()))
            }
            Self::ReturnTip => "return_tip()".to_string(),
            Self::Aspirate {
                volume,
                location,
                rate,
            } => format!("aspirate({volume}, {}, rate={rate})", location.to_python()),
            Self::Dispense {
                volume,
                location,
                rate,
            } => format!("dispense({volume}, {}, rate={rate})", location.to_python()),
            Self::Mix {
                repetitions,
                volume,
                location,
                rate,
            } => match location {
                Some(location) => format!(
                    "mix({repetitions}, {volume}, {}, rate={rate})",
                    location.to_python()
                ),
                None => format!("mix({repetitions}, {volume}, rate={rate})"),
            },
            Self::BlowOut { location } => {
                format!("blow_out({})", optional_location(location.as_ref()))
            }
            Self::MoveTo { location } => format!("move_to({})", location.to_python()),
            Self::Home => "home()".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GripperAction {
    MoveTo {
        location: Location,
    },
    Grip {
        #[serde(default = "default_grip_force")]
        force_pascals: f64,
    },
    Ungrip,
    Home,
}

impl GripperAction {
    pub fn grip() -> Self {
        Self::Grip {
            force_pascals: DEFAULT_GRIP_FORCE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::MoveTo { location } => location.validate(),
            Self::Grip { force_pascals } => check_positive("force_pascals", *force_pascals),
            Self::Ungrip | Self::Home => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipette {
    pub config: InstrumentConfig,
}

impl Pipette {
    pub fn mount(&self) -> Option<Mount> {
        match &self.config.kind {
            InstrumentKind::Pipette { mount, .. } => Some(*mount),
            InstrumentKind::Gripper => None,
        }
    }

    pub fn statement(&self, action: &PipetteAction) -> Result<String, ConfigError> {
        action.validate()?;
        Ok(format!("{}.{}", self.config.nickname, action.call()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gripper {
    pub config: InstrumentConfig,
}

impl Gripper {
    pub fn statement(&self, action: &GripperAction) -> Result<String, ConfigError> {
        action.validate()?;
        let nickname = &self.config.nickname;
        Ok(match action {
            GripperAction::MoveTo { location } => {
                format!("{nickname}.move_to({})", location.to_python())
            }
            GripperAction::Grip { force_pascals } => format!("{nickname}.grip({force_pascals})"),
            GripperAction::Ungrip => format!("{nickname}.ungrip()"),
            // The gripper has no home of its own; homing the gantry parks it.
            GripperAction::Home => "protocol.home()".to_string(),
        })
    }
}

/// An action for whichever instrument variant receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstrumentAction {
    Pipette(PipetteAction),
    Gripper(GripperAction),
}

impl From<PipetteAction> for InstrumentAction {
    fn from(action: PipetteAction) -> Self {
        Self::Pipette(action)
    }
}

impl From<GripperAction> for InstrumentAction {
    fn from(action: GripperAction) -> Self {
        Self::Gripper(action)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instrument {
    Pipette(Pipette),
    Gripper(Gripper),
}

impl Instrument {
    pub fn from_config(config: InstrumentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(match config.kind {
            InstrumentKind::Pipette { .. } => Self::Pipette(Pipette { config }),
            InstrumentKind::Gripper => Self::Gripper(Gripper { config }),
        })
    }

    pub fn config(&self) -> &InstrumentConfig {
        match self {
            Self::Pipette(p) => &p.config,
            Self::Gripper(g) => &g.config,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.config().nickname
    }

    pub fn load_statement(&self) -> String {
        self.config().load_statement()
    }

    /// Statement for `action`, rejecting actions meant for the other variant.
    pub fn statement(&self, action: &InstrumentAction) -> Result<String, ConfigError> {
        match (self, action) {
            (Self::Pipette(p), InstrumentAction::Pipette(a)) => p.statement(a),
            (Self::Gripper(g), InstrumentAction::Gripper(a)) => g.statement(a),
            // Home and move-to read the same for both variants.
            (Self::Pipette(p), InstrumentAction::Gripper(GripperAction::Home)) => {
                p.statement(&PipetteAction::Home)
            }
            (Self::Pipette(p), InstrumentAction::Gripper(GripperAction::MoveTo { location })) => {
                p.statement(&PipetteAction::MoveTo {
                    location: location.clone(),
                })
            }
            (Self::Gripper(g), InstrumentAction::Pipette(PipetteAction::Home)) => {
                g.statement(&GripperAction::Home)
            }
            (Self::Gripper(g), InstrumentAction::Pipette(PipetteAction::MoveTo { location })) => {
                g.statement(&GripperAction::MoveTo {
                    location: location.clone(),
                })
            }
            (instrument, _) => Err(ConfigError::OutOfRange {
                field: "action",
                constraint: match instrument {
                    Self::Pipette(_) => "a pipette action",
                    Self::Gripper(_) => "a gripper action",
                },
                value: format!("{action:?}"),
            }),
        }
    }

    /// Load the instrument in the session's interpreter.
    pub async fn load<T: Transport>(
        &self,
        session: &Session<T>,
    ) -> Result<CommandOutcome, SessionError> {
        session.ensure_mode(SessionMode::Interpreter).await?;
        tracing::info!("Loading {} on {}", self.nickname(), self.config().mount_name());
        session
            .execute(&self.load_statement(), SessionMode::Interpreter, None)
            .await
    }

    /// Run one action. Invalid actions are rejected before anything is sent.
    pub async fn execute<T: Transport>(
        &self,
        session: &Session<T>,
        action: impl Into<InstrumentAction>,
    ) -> Result<CommandOutcome, SessionError> {
        let statement = self.statement(&action.into())?;
        tracing::debug!("{}: {}", self.nickname(), statement);
        session
            .execute(&statement, SessionMode::Interpreter, None)
            .await
    }
}
