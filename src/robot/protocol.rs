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

//! The protocol context on the robot and what has been loaded into it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::config::{InstrumentConfig, InstrumentKind, LabwareConfig, ModuleConfig, Slot};
use super::instrument::Instrument;
use crate::batch::{run_batch, BatchItem, BatchItemResult, BatchOptions};
use crate::envelope::py_literal;
use crate::error::{ConfigError, SessionError};
use crate::session::{CommandOutcome, Session, SessionMode};
use crate::transport::Transport;

pub const DEFAULT_API_VERSION: &str = "2.21";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSetup {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Use `opentrons.simulate` instead of driving the hardware.
    #[serde(default)]
    pub simulate: bool,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Default for ProtocolSetup {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            simulate: false,
        }
    }
}

impl ProtocolSetup {
    pub fn simulated() -> Self {
        Self {
            simulate: true,
            ..Self::default()
        }
    }

    /// Statements that leave a `protocol` context bound in the interpreter.
    pub fn preamble(&self) -> Vec<BatchItem> {
        let module = if self.simulate {
            "opentrons.simulate"
        } else {
            "opentrons.execute"
        };
        vec![
            BatchItem::new("Import json", "import json"),
            BatchItem::new("Import Opentrons types", "from opentrons import types"),
            BatchItem::new(format!("Import {module}"), format!("import {module}")),
            BatchItem::new(
                format!("Get protocol API {}", self.api_version),
                format!(
                    "protocol = {module}.get_protocol_api({})",
                    py_literal(&self.api_version)
                ),
            ),
        ]
    }
}

/// Destination of a labware move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckTarget {
    Slot(Slot),
    /// A loaded module, by nickname.
    Module(String),
    OffDeck,
}

/// A deck layout as written in a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default)]
    pub setup: ProtocolSetup,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub labware: Vec<LabwareConfig>,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// Everything loaded into the protocol context, by nickname.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    pub setup: ProtocolSetup,
    labware: BTreeMap<String, LabwareConfig>,
    modules: BTreeMap<String, ModuleConfig>,
    instruments: BTreeMap<String, Instrument>,
}

impl Deck {
    pub fn new(setup: ProtocolSetup) -> Self {
        Self {
            setup,
            ..Self::default()
        }
    }

    /// Validate a layout and build the deck from it.
    pub fn from_config(config: DeckConfig) -> Result<Self, ConfigError> {
        let mut deck = Self::new(config.setup);
        for module in config.modules {
            deck.add_module(module)?;
        }
        for labware in config.labware {
            deck.add_labware(labware)?;
        }
        for instrument in config.instruments {
            deck.add_instrument(Instrument::from_config(instrument)?)?;
        }
        Ok(deck)
    }

    fn check_free_nickname(&self, nickname: &str) -> Result<(), ConfigError> {
        if self.labware.contains_key(nickname)
            || self.modules.contains_key(nickname)
            || self.instruments.contains_key(nickname)
            || nickname == "protocol"
        {
            return Err(ConfigError::Duplicate {
                nickname: nickname.to_string(),
            });
        }
        Ok(())
    }

    fn check_free_slot(&self, slot: &Slot) -> Result<(), ConfigError> {
        let occupant = self
            .labware
            .values()
            .map(|l| (&l.slot, &l.nickname))
            .chain(self.modules.values().map(|m| (&m.slot, &m.nickname)))
            .find(|(s, _)| *s == slot);
        match occupant {
            Some((_, nickname)) => Err(ConfigError::SlotOccupied {
                slot: slot.to_string(),
                occupant: nickname.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn add_labware(&mut self, config: LabwareConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.check_free_nickname(&config.nickname)?;
        self.check_free_slot(&config.slot)?;
        self.labware.insert(config.nickname.clone(), config);
        Ok(())
    }

    pub fn add_module(&mut self, config: ModuleConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.check_free_nickname(&config.nickname)?;
        self.check_free_slot(&config.slot)?;
        self.modules.insert(config.nickname.clone(), config);
        Ok(())
    }

    /// Add an instrument. Its tip racks must already be on the deck.
    pub fn add_instrument(&mut self, instrument: Instrument) -> Result<(), ConfigError> {
        self.check_free_nickname(instrument.nickname())?;
        if let InstrumentKind::Pipette { tip_racks, .. } = &instrument.config().kind {
            for rack in tip_racks {
                self.labware(rack)?;
            }
        }
        self.instruments
            .insert(instrument.nickname().to_string(), instrument);
        Ok(())
    }

    pub fn labware(&self, nickname: &str) -> Result<&LabwareConfig, ConfigError> {
        self.labware.get(nickname).ok_or_else(|| unknown(nickname))
    }

    pub fn module(&self, nickname: &str) -> Result<&ModuleConfig, ConfigError> {
        self.modules.get(nickname).ok_or_else(|| unknown(nickname))
    }

    pub fn instrument(&self, nickname: &str) -> Result<&Instrument, ConfigError> {
        self.instruments.get(nickname).ok_or_else(|| unknown(nickname))
    }

    pub fn labware_names(&self) -> impl Iterator<Item = &str> {
        self.labware.keys().map(String::as_str)
    }

    /// Preamble, then modules, labware and instruments, in dependency order.
    pub fn setup_items(&self) -> Vec<BatchItem> {
        let mut items = self.setup.preamble();
        for module in self.modules.values() {
            for statement in module.load_statements() {
                items.push(BatchItem::new(
                    format!("Load module {} in slot {}", module.nickname, module.slot),
                    statement,
                ));
            }
        }
        for labware in self.labware.values() {
            items.push(BatchItem::new(
                format!("Load labware {} in slot {}", labware.nickname, labware.slot),
                labware.load_statement(),
            ));
        }
        for instrument in self.instruments.values() {
            items.push(BatchItem::new(
                format!(
                    "Load instrument {} on {}",
                    instrument.nickname(),
                    instrument.config().mount_name()
                ),
                instrument.load_statement(),
            ));
        }
        items
    }

    /// Bind everything on the deck in the session's interpreter, stopping at
    /// the first failure.
    pub async fn load<T: Transport>(
        &self,
        session: &Session<T>,
        delay_between: Duration,
    ) -> Result<Vec<BatchItemResult>, SessionError> {
        let options = BatchOptions {
            delay_between,
            stop_on_error: true,
            timeout: None,
        };
        run_batch(session, SessionMode::Interpreter, &self.setup_items(), &options).await
    }

    pub fn move_labware_statement(
        &self,
        labware: &str,
        target: &DeckTarget,
        use_gripper: bool,
    ) -> Result<String, ConfigError> {
        self.labware(labware)?;
        let destination = match target {
            DeckTarget::Slot(slot) => py_literal(slot.as_str()),
            DeckTarget::Module(nickname) => self.module(nickname)?.target_name(),
            DeckTarget::OffDeck => "protocol_api.OFF_DECK".to_string(),
        };
        let prefix = match target {
            DeckTarget::OffDeck => "from opentrons import protocol_api; ",
            _ => "",
        };
        Ok(format!(
            "{prefix}protocol.move_labware({labware}, {destination}, use_gripper={})",
            if use_gripper { "True" } else { "False" }
        ))
    }

    pub async fn move_labware<T: Transport>(
        &self,
        session: &Session<T>,
        labware: &str,
        target: &DeckTarget,
        use_gripper: bool,
    ) -> Result<CommandOutcome, SessionError> {
        let statement = self.move_labware_statement(labware, target, use_gripper)?;
        protocol_call(session, &statement).await
    }

    pub async fn home<T: Transport>(
        &self,
        session: &Session<T>,
    ) -> Result<CommandOutcome, SessionError> {
        protocol_call(session, "protocol.home()").await
    }

    pub async fn pause<T: Transport>(
        &self,
        session: &Session<T>,
        message: Option<&str>,
    ) -> Result<CommandOutcome, SessionError> {
        let statement = match message {
            Some(message) => format!("protocol.pause({})", py_literal(message)),
            None => "protocol.pause()".to_string(),
        };
        protocol_call(session, &statement).await
    }

    pub async fn resume<T: Transport>(
        &self,
        session: &Session<T>,
    ) -> Result<CommandOutcome, SessionError> {
        protocol_call(session, "protocol.resume()").await
    }

    pub async fn comment<T: Transport>(
        &self,
        session: &Session<T>,
        message: &str,
    ) -> Result<CommandOutcome, SessionError> {
        protocol_call(session, &format!("protocol.comment({})", py_literal(message))).await
    }

    /// Remote delay. The command timeout is stretched to cover it.
    pub async fn delay<T: Transport>(
        &self,
        session: &Session<T>,
        duration: Duration,
        message: Option<&str>,
    ) -> Result<CommandOutcome, SessionError> {
        let mut statement = format!("protocol.delay(seconds={}", duration.as_secs_f64());
        if let Some(message) = message {
            statement.push_str(&format!(", msg={}", py_literal(message)));
        }
        statement.push(')');
        let timeout = session.settings().command_timeout + duration;
        session
            .execute(&statement, SessionMode::Interpreter, Some(timeout))
            .await
    }
}

fn unknown(nickname: &str) -> ConfigError {
    ConfigError::UnknownNickname {
        nickname: nickname.to_string(),
    }
}

async fn protocol_call<T: Transport>(
    session: &Session<T>,
    statement: &str,
) -> Result<CommandOutcome, SessionError> {
    session
        .execute(statement, SessionMode::Interpreter, None)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck() -> Deck {
        let mut deck = Deck::new(ProtocolSetup::simulated());
        deck.add_labware(LabwareConfig::new("tips", "opentrons_96_tiprack_300ul", "1").unwrap())
            .unwrap();
        deck.add_labware(LabwareConfig::new("plate", "corning_96_wellplate_360ul_flat", "2").unwrap())
            .unwrap();
        deck.add_module(ModuleConfig::new("temp", "temperature module gen2", "3").unwrap())
            .unwrap();
        deck.add_instrument(
            Instrument::from_config(
                InstrumentConfig::pipette("p300", "p300_single_gen2", "left")
                    .unwrap()
                    .with_tip_racks(["tips"])
                    .unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
        deck
    }

    #[test]
    fn test_preamble() {
        let items = ProtocolSetup::default().preamble();
        assert_eq!(
            items.last().unwrap().command,
            "protocol = opentrons.execute.get_protocol_api(\"2.21\")"
        );
        let simulated = ProtocolSetup::simulated().preamble();
        assert!(simulated.iter().any(|i| i.command == "import opentrons.simulate"));
    }

    #[test]
    fn test_setup_order() {
        let items = deck().setup_items();
        let commands: Vec<&str> = items.iter().map(|i| i.command.as_str()).collect();
        let module = commands.iter().position(|c| c.starts_with("temp =")).unwrap();
        let tips = commands.iter().position(|c| c.starts_with("tips =")).unwrap();
        let pipette = commands.iter().position(|c| c.starts_with("p300 =")).unwrap();
        assert!(module < tips && tips < pipette);
        assert_eq!(items.len(), 4 + 4);
    }

    #[test]
    fn test_conflicts() {
        let mut deck = deck();
        assert!(matches!(
            deck.add_labware(LabwareConfig::new("plate", "nest_12_reservoir_15ml", "5").unwrap()),
            Err(ConfigError::Duplicate { .. })
        ));
        assert!(matches!(
            deck.add_labware(LabwareConfig::new("res", "nest_12_reservoir_15ml", "2").unwrap()),
            Err(ConfigError::SlotOccupied { .. })
        ));
        let orphan = Instrument::from_config(
            InstrumentConfig::pipette("p20", "p20_single_gen2", "right")
                .unwrap()
                .with_tip_racks(["tips20"])
                .unwrap(),
        )
        .unwrap();
        assert!(matches!(
            deck.add_instrument(orphan),
            Err(ConfigError::UnknownNickname { .. })
        ));
    }

    #[test]
    fn test_deck_from_yaml() {
        let yaml = r#"
setup:
  simulate: true
labware:
  - nickname: tips
    load_name: opentrons_96_tiprack_300ul
    slot: "1"
  - nickname: plate
    load_name: corning_96_wellplate_360ul_flat
    slot: "2"
instruments:
  - nickname: p300
    type: pipette
    model: p300_single_gen2
    mount: right
    tip_racks: [tips]
"#;
        let config: DeckConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.setup.api_version, DEFAULT_API_VERSION);
        let deck = Deck::from_config(config).unwrap();
        assert!(deck.instrument("p300").is_ok());
        assert_eq!(deck.labware_names().collect::<Vec<_>>(), vec!["plate", "tips"]);

        let bad = "labware:\n  - nickname: plate\n    load_name: x\n    slot: \"13\"\n";
        assert!(serde_yaml::from_str::<DeckConfig>(bad).is_err());
    }

    #[test]
    fn test_move_labware_statement() {
        let deck = deck();
        let slot: Slot = "5".parse().unwrap();
        assert_eq!(
            deck.move_labware_statement("plate", &DeckTarget::Slot(slot), false)
                .unwrap(),
            "protocol.move_labware(plate, \"5\", use_gripper=False)"
        );
        assert_eq!(
            deck.move_labware_statement("plate", &DeckTarget::Module("temp".into()), true)
                .unwrap(),
            "protocol.move_labware(plate, temp, use_gripper=True)"
        );
        assert!(deck
            .move_labware_statement("missing", &DeckTarget::OffDeck, true)
            .is_err());
    }
}
