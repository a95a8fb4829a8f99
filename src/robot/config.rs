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

//! Typed, validated descriptions of what goes on the deck.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::is_python_identifier;
use crate::envelope::py_literal;
use crate::error::ConfigError;

static FLEX_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-D][1-4]$").expect("static slot pattern"));

/// Reject nicknames that cannot be bound as Python names on the robot.
pub(crate) fn check_nickname(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_python_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

fn check_not_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { field })
    } else {
        Ok(())
    }
}

/// A deck slot: `1`-`12` on an OT-2, `A1`-`D4` on a Flex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(String);

impl Slot {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Slot {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = match s.parse::<u8>() {
            Ok(n) => (1..=12).contains(&n) && !s.starts_with('0'),
            Err(_) => FLEX_SLOT.is_match(s),
        };
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ConfigError::InvalidSlot {
                value: s.to_string(),
            })
        }
    }
}

impl TryFrom<String> for Slot {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for Mount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(ConfigError::InvalidMount {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabwareConfig {
    pub nickname: String,
    pub load_name: String,
    pub slot: Slot,
    /// Custom labware definition, as a path on the robot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_file: Option<String>,
}

impl LabwareConfig {
    pub fn new(nickname: &str, load_name: &str, slot: &str) -> Result<Self, ConfigError> {
        let config = Self {
            nickname: nickname.to_string(),
            load_name: load_name.to_string(),
            slot: slot.parse()?,
            definition_file: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_definition_file(mut self, path: impl Into<String>) -> Self {
        self.definition_file = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nickname("labware nickname", &self.nickname)?;
        check_not_empty("labware load_name", &self.load_name)?;
        if let Some(path) = &self.definition_file {
            check_not_empty("labware definition_file", path)?;
        }
        Ok(())
    }

    pub fn load_statement(&self) -> String {
        match &self.definition_file {
            Some(path) => format!(
                "{nick} = protocol.load_labware_from_definition(json.load(open({path})), {slot})",
                path = py_literal(path),
                nick = self.nickname,
                slot = py_literal(self.slot.as_str()),
            ),
            None => format!(
                "{} = protocol.load_labware({}, {})",
                self.nickname,
                py_literal(&self.load_name),
                py_literal(self.slot.as_str())
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstrumentKind {
    Pipette {
        model: String,
        mount: Mount,
        /// Nicknames of tip rack labware.
        #[serde(default)]
        tip_racks: Vec<String>,
    },
    /// Flex gripper. Always on the extension mount.
    Gripper,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub nickname: String,
    #[serde(flatten)]
    pub kind: InstrumentKind,
}

impl InstrumentConfig {
    pub fn pipette(nickname: &str, model: &str, mount: &str) -> Result<Self, ConfigError> {
        let config = Self {
            nickname: nickname.to_string(),
            kind: InstrumentKind::Pipette {
                model: model.to_string(),
                mount: mount.parse()?,
                tip_racks: Vec::new(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn gripper(nickname: &str) -> Result<Self, ConfigError> {
        let config = Self {
            nickname: nickname.to_string(),
            kind: InstrumentKind::Gripper,
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach tip racks to a pipette. Ignored for the gripper.
    pub fn with_tip_racks<I, S>(mut self, racks: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let InstrumentKind::Pipette { tip_racks, .. } = &mut self.kind {
            tip_racks.extend(racks.into_iter().map(Into::into));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn mount_name(&self) -> &'static str {
        match &self.kind {
            InstrumentKind::Pipette { mount, .. } => mount.as_str(),
            InstrumentKind::Gripper => "extension",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nickname("instrument nickname", &self.nickname)?;
        if let InstrumentKind::Pipette {
            model, tip_racks, ..
        } = &self.kind
        {
            check_not_empty("pipette model", model)?;
            for rack in tip_racks {
                check_nickname("tip rack nickname", rack)?;
            }
        }
        Ok(())
    }

    pub fn load_statement(&self) -> String {
        match &self.kind {
            InstrumentKind::Pipette {
                model, tip_racks, ..
            } => format!(
                "{} = protocol.load_instrument({}, {}, tip_racks=[{}])",
                self.nickname,
                py_literal(model),
                py_literal(self.mount_name()),
                tip_racks.join(", ")
            ),
            InstrumentKind::Gripper => format!(
                "{} = protocol.load_instrument('flex_gripper', 'extension')",
                self.nickname
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub nickname: String,
    pub module_name: String,
    pub slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
}

impl ModuleConfig {
    pub fn new(nickname: &str, module_name: &str, slot: &str) -> Result<Self, ConfigError> {
        let config = Self {
            nickname: nickname.to_string(),
            module_name: module_name.to_string(),
            slot: slot.parse()?,
            adapter: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Result<Self, ConfigError> {
        self.adapter = Some(adapter.into());
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nickname("module nickname", &self.nickname)?;
        check_not_empty("module_name", &self.module_name)?;
        if let Some(adapter) = &self.adapter {
            check_not_empty("module adapter", adapter)?;
        }
        Ok(())
    }

    /// The name labware on this module should be loaded onto.
    pub fn target_name(&self) -> String {
        match self.adapter {
            Some(_) => format!("{}_adapter", self.nickname),
            None => self.nickname.clone(),
        }
    }

    pub fn load_statements(&self) -> Vec<String> {
        let mut statements = vec![format!(
            "{} = protocol.load_module({}, {})",
            self.nickname,
            py_literal(&self.module_name),
            py_literal(self.slot.as_str())
        )];
        if let Some(adapter) = &self.adapter {
            statements.push(format!(
                "{} = {}.load_adapter({})",
                self.target_name(),
                self.nickname,
                py_literal(adapter)
            ));
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots() {
        for ok in ["1", "9", "12", "A1", "D4", "C3"] {
            assert!(ok.parse::<Slot>().is_ok(), "{ok}");
        }
        for bad in ["0", "13", "01", "E1", "A5", "a1", ""] {
            assert!(
                matches!(bad.parse::<Slot>(), Err(ConfigError::InvalidSlot { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_mounts() {
        assert_eq!("Left".parse::<Mount>().unwrap(), Mount::Left);
        assert!(matches!(
            "extension".parse::<Mount>(),
            Err(ConfigError::InvalidMount { .. })
        ));
    }

    #[test]
    fn test_labware_nickname_must_be_identifier() {
        let err = LabwareConfig::new("my plate", "corning_96_wellplate_360ul_flat", "1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier { .. }));
        let err = LabwareConfig::new("class", "corning_96_wellplate_360ul_flat", "1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_labware_load_statement() {
        let plate = LabwareConfig::new("plate", "corning_96_wellplate_360ul_flat", "2").unwrap();
        assert_eq!(
            plate.load_statement(),
            "plate = protocol.load_labware(\"corning_96_wellplate_360ul_flat\", \"2\")"
        );

        let custom = plate.with_definition_file("/data/labware/custom.json");
        assert!(custom
            .load_statement()
            .contains("load_labware_from_definition(json.load(open(\"/data/labware/custom.json\")), \"2\")"));
    }

    #[test]
    fn test_pipette_and_gripper_statements() {
        let p300 = InstrumentConfig::pipette("p300", "p300_single_gen2", "right")
            .unwrap()
            .with_tip_racks(["tips"])
            .unwrap();
        assert_eq!(
            p300.load_statement(),
            "p300 = protocol.load_instrument(\"p300_single_gen2\", \"right\", tip_racks=[tips])"
        );

        let gripper = InstrumentConfig::gripper("gripper").unwrap();
        assert_eq!(gripper.mount_name(), "extension");
        assert!(gripper.load_statement().contains("'flex_gripper', 'extension'"));
    }

    #[test]
    fn test_instrument_from_yaml() {
        let yaml = "nickname: p20\ntype: pipette\nmodel: p20_single_gen2\nmount: left\n";
        let config: InstrumentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mount_name(), "left");

        let bad = "nickname: p20\ntype: pipette\nmodel: p20_single_gen2\nmount: extension\n";
        assert!(serde_yaml::from_str::<InstrumentConfig>(bad).is_err());
    }

    #[test]
    fn test_module_with_adapter() {
        let heater = ModuleConfig::new("hs", "heaterShakerModuleV1", "D1")
            .unwrap()
            .with_adapter("opentrons_96_flat_bottom_adapter")
            .unwrap();
        let statements = heater.load_statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[1],
            "hs_adapter = hs.load_adapter(\"opentrons_96_flat_bottom_adapter\")"
        );
        assert!(ModuleConfig::new("hs", "heaterShakerModuleV1", "13").is_err());
    }
}
