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

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::config::check_nickname;
use crate::error::ConfigError;

static WELL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-P](?:[1-9]|1[0-9]|2[0-4])$").expect("static well pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellPosition {
    #[default]
    Top,
    Bottom,
    Center,
}

/// Millimetres relative to the reference point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Offset {
    pub fn z(z: f64) -> Self {
        Self { z, ..Self::default() }
    }

    fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (field, value) in [("offset x", self.x), ("offset y", self.y), ("offset z", self.z)] {
            if !value.is_finite() {
                return Err(ConfigError::OutOfRange {
                    field,
                    constraint: "a finite number",
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Where an instrument should go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Location {
    Well {
        labware: String,
        well: String,
        #[serde(default)]
        position: WellPosition,
        #[serde(default)]
        offset: Offset,
    },
    /// Absolute deck coordinates.
    Point { x: f64, y: f64, z: f64 },
}

impl Location {
    pub fn top(labware: &str, well: &str) -> Self {
        Self::well(labware, well, WellPosition::Top, Offset::default())
    }

    pub fn bottom(labware: &str, well: &str, z: f64) -> Self {
        Self::well(labware, well, WellPosition::Bottom, Offset::z(z))
    }

    pub fn center(labware: &str, well: &str) -> Self {
        Self::well(labware, well, WellPosition::Center, Offset::default())
    }

    pub fn well(labware: &str, well: &str, position: WellPosition, offset: Offset) -> Self {
        Self::Well {
            labware: labware.to_string(),
            well: well.to_string(),
            position,
            offset,
        }
    }

    pub fn point(x: f64, y: f64, z: f64) -> Self {
        Self::Point { x, y, z }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Well {
                labware,
                well,
                offset,
                ..
            } => {
                check_nickname("labware nickname", labware)?;
                if !WELL_NAME.is_match(well) {
                    return Err(ConfigError::InvalidWell {
                        value: well.clone(),
                    });
                }
                offset.check()
            }
            Self::Point { x, y, z } => Offset {
                x: *x,
                y: *y,
                z: *z,
            }
            .check(),
        }
    }

    /// Labware this location refers to, if any.
    pub fn labware(&self) -> Option<&str> {
        match self {
            Self::Well { labware, .. } => Some(labware),
            Self::Point { .. } => None,
        }
    }

    /// Python expression evaluating to an `opentrons.types.Location`.
    pub fn to_python(&self) -> String {
        match self {
            Self::Well {
                labware,
                well,
                position,
                offset,
            } => {
                let base = format!("{labware}['{well}']");
                match position {
                    WellPosition::Top | WellPosition::Bottom => {
                        let method = if *position == WellPosition::Top { "top" } else { "bottom" };
                        let mut expr = format!("{base}.{method}({})", offset.z);
                        if offset.x != 0.0 || offset.y != 0.0 {
                            expr.push_str(&format!(
                                ".move(types.Point(x={}, y={}, z=0))",
                                offset.x, offset.y
                            ));
                        }
                        expr
                    }
                    WellPosition::Center if offset.is_zero() => format!("{base}.center()"),
                    WellPosition::Center => format!(
                        "{base}.center().move(types.Point(x={}, y={}, z={}))",
                        offset.x, offset.y, offset.z
                    ),
                }
            }
            Self::Point { x, y, z } => {
                format!("types.Location(types.Point(x={x}, y={y}, z={z}), None)")
            }
        }
    }
}
