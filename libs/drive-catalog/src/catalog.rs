//! Per-model parameter and channel tables
//!
//! One typed table per supported drive generation, built once when the
//! model is selected. The catalog carries no signed flag for parameters;
//! the store derives signedness from the default value's sign, so defaults
//! here are part of the protocol contract, not just display hints.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported drive generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveModel {
    V5,
    V6,
}

impl DriveModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V5 => "v5",
            Self::V6 => "v6",
        }
    }

    /// All models the catalog has tables for
    pub fn supported() -> &'static [DriveModel] {
        &[Self::V5, Self::V6]
    }

    /// Factory serial speed of this generation's service port
    pub fn default_baud_rate(&self) -> u32 {
        match self {
            Self::V5 => 19200,
            Self::V6 => 57600,
        }
    }
}

impl fmt::Display for DriveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v5" => Ok(Self::V5),
            "v6" => Ok(Self::V6),
            other => Err(format!("unknown drive model: {other}")),
        }
    }
}

/// One configuration register as documented for the selected model
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Short code shown in the table and used as the replay filter key
    pub code: String,
    /// Bare register address; writes OR in the write-select bit
    pub address: u16,
    pub name: String,
    /// Factory default in engineering units. A negative default marks the
    /// register as signed for decoding.
    pub default_value: f64,
    /// Decimal places of the displayed value; 0 for integer registers
    pub decimal_places: u32,
    pub unit: Option<String>,
    pub description: String,
    /// Safe to apply immediately, without a drive power cycle
    pub gain_relevant: bool,
}

/// Ordered parameters under one table heading
#[derive(Debug, Clone)]
pub struct ParameterGroup {
    pub name: String,
    pub parameters: Vec<ParameterDescriptor>,
}

/// One telemetry signal: a single register, or two consecutive registers
/// combined high word first into a 32-bit value
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDef {
    /// Unique name, also the persistence key for channel settings
    pub name: String,
    pub registers: Vec<u16>,
    pub signed: bool,
}

impl ChannelDef {
    pub fn new(name: &str, registers: Vec<u16>, signed: bool) -> Self {
        debug_assert!((1..=2).contains(&registers.len()));
        Self {
            name: name.to_string(),
            registers,
            signed,
        }
    }

    /// Two-register channels decode as 32-bit composites
    pub fn is_composite(&self) -> bool {
        self.registers.len() == 2
    }
}

/// The immutable per-model table set, resolved once at model selection
#[derive(Debug, Clone)]
pub struct DriveCatalog {
    pub model: DriveModel,
    pub groups: Vec<ParameterGroup>,
    pub channels: Vec<ChannelDef>,
}

#[allow(clippy::too_many_arguments)]
fn param(
    code: &str,
    address: u16,
    name: &str,
    default_value: f64,
    decimal_places: u32,
    unit: Option<&str>,
    description: &str,
    gain_relevant: bool,
) -> ParameterDescriptor {
    ParameterDescriptor {
        code: code.to_string(),
        address,
        name: name.to_string(),
        default_value,
        decimal_places,
        unit: unit.map(str::to_string),
        description: description.to_string(),
        gain_relevant,
    }
}

impl DriveCatalog {
    /// Build the catalog for the selected model.
    pub fn for_model(model: DriveModel) -> Self {
        match model {
            DriveModel::V5 => Self::v5(),
            DriveModel::V6 => Self::v6(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&ParameterGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Look up a parameter by its short code, across all groups.
    pub fn find_parameter(&self, code: &str) -> Option<&ParameterDescriptor> {
        self.groups
            .iter()
            .flat_map(|g| g.parameters.iter())
            .find(|p| p.code == code)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelDef> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Codes of parameters safe to apply without a power cycle; the
    /// allow-list for gains-only file replay.
    pub fn gain_relevant_codes(&self) -> HashSet<String> {
        self.groups
            .iter()
            .flat_map(|g| g.parameters.iter())
            .filter(|p| p.gain_relevant)
            .map(|p| p.code.clone())
            .collect()
    }

    fn v6() -> Self {
        let groups = vec![
            ParameterGroup {
                name: "System".to_string(),
                parameters: vec![
                    param("P00", 0x0080, "Motor Code", 57.0, 0, None,
                        "Motor model selector; consult the sizing table before changing", false),
                    param("P01", 0x0081, "Control Mode", 1.0, 0, None,
                        "0 = internal test, 1 = pulse position, 2 = analog speed", false),
                    param("P02", 0x0082, "Motor Direction", 0.0, 0, None,
                        "0 = CCW positive, 1 = CW positive", false),
                    param("P03", 0x0083, "Rated Current", 4.0, 1, Some("A"),
                        "Continuous current limit of the attached motor", false),
                    param("P04", 0x0084, "Maximum Speed", 3000.0, 0, Some("rpm"),
                        "Absolute speed clamp in all modes", false),
                    param("P05", 0x0085, "Jog Speed", 60.0, 0, Some("rpm"),
                        "Speed used by the panel jog function", false),
                ],
            },
            ParameterGroup {
                name: "Position Loop".to_string(),
                parameters: vec![
                    param("P40", 0x0096, "Position Proportional Gain", 25.0, 0, None,
                        "Stiffness of the position loop; too high causes hunting", true),
                    param("P41", 0x0097, "Position Feedforward Gain", 0.0, 0, Some("%"),
                        "Reduces following error at constant speed", true),
                    param("P42", 0x0098, "Position Feedforward Filter", 10.0, 1, Some("ms"),
                        "Low-pass on the feedforward path", true),
                    param("P43", 0x0099, "Electronic Gear Numerator", 1.0, 0, None,
                        "Command pulse multiplier", false),
                    param("P44", 0x009A, "Electronic Gear Denominator", 1.0, 0, None,
                        "Command pulse divider", false),
                    param("P45", 0x009B, "Position Error Limit", 400.0, 0, Some("pulse"),
                        "Following error that trips the drive", false),
                ],
            },
            ParameterGroup {
                name: "Speed Loop".to_string(),
                parameters: vec![
                    param("P60", 0x00A5, "Speed Proportional Gain", 120.0, 0, None,
                        "Speed loop stiffness", true),
                    param("P61", 0x00A6, "Speed Integral Time", 25.0, 1, Some("ms"),
                        "Smaller values stiffen the loop but amplify noise", true),
                    param("P62", 0x00A7, "Speed Feedforward Gain", 0.0, 0, Some("%"),
                        "Acceleration feedforward into the torque command", true),
                    param("P63", 0x00A8, "Speed Smoothing Constant", 5.0, 0, None,
                        "Command smoothing steps", false),
                    param("P64", 0x00A9, "Speed Command Offset", -5.0, 1, Some("rpm"),
                        "Analog command zero correction", false),
                ],
            },
            ParameterGroup {
                name: "Current Loop".to_string(),
                parameters: vec![
                    param("P80", 0x00C0, "Current Proportional Gain", 300.0, 0, None,
                        "Torque loop stiffness; motor dependent", true),
                    param("P81", 0x00C1, "Current Integral Time", 10.0, 1, Some("ms"),
                        "Torque loop integral action", true),
                    param("P82", 0x00C2, "Torque Limit", 150.0, 0, Some("%"),
                        "Peak torque as percentage of rated", false),
                    param("P83", 0x00C3, "Current Offset", -1.5, 2, Some("A"),
                        "Phase current sensor zero correction", false),
                ],
            },
        ];

        let channels = vec![
            ChannelDef::new("Position Command", vec![0x0040, 0x0041], true),
            ChannelDef::new("Position Feedback", vec![0x0042, 0x0043], true),
            ChannelDef::new("Position Error", vec![0x0044, 0x0045], true),
            ChannelDef::new("Speed Command", vec![0x0046], true),
            ChannelDef::new("Speed Feedback", vec![0x0047], true),
            ChannelDef::new("Torque Current", vec![0x0048], true),
            ChannelDef::new("Bus Voltage", vec![0x0049], false),
        ];

        Self {
            model: DriveModel::V6,
            groups,
            channels,
        }
    }

    fn v5() -> Self {
        // The older generation exposes a reduced register map; the gain
        // registers live in a single combined group.
        let groups = vec![
            ParameterGroup {
                name: "System".to_string(),
                parameters: vec![
                    param("P00", 0x0080, "Motor Code", 42.0, 0, None,
                        "Motor model selector", false),
                    param("P01", 0x0081, "Control Mode", 1.0, 0, None,
                        "0 = internal test, 1 = pulse position", false),
                    param("P02", 0x0082, "Motor Direction", 0.0, 0, None,
                        "0 = CCW positive, 1 = CW positive", false),
                    param("P03", 0x0083, "Maximum Speed", 2000.0, 0, Some("rpm"),
                        "Absolute speed clamp", false),
                ],
            },
            ParameterGroup {
                name: "Gains".to_string(),
                parameters: vec![
                    param("P10", 0x0090, "Position Proportional Gain", 20.0, 0, None,
                        "Stiffness of the position loop", true),
                    param("P11", 0x0091, "Speed Proportional Gain", 100.0, 0, None,
                        "Speed loop stiffness", true),
                    param("P12", 0x0092, "Speed Integral Time", 30.0, 1, Some("ms"),
                        "Speed loop integral action", true),
                    param("P13", 0x0093, "Position Feedforward Gain", 0.0, 0, Some("%"),
                        "Reduces following error at constant speed", true),
                    param("P14", 0x0094, "Speed Command Offset", -5.0, 1, Some("rpm"),
                        "Analog command zero correction", false),
                ],
            },
        ];

        let channels = vec![
            ChannelDef::new("Speed Command", vec![0x0041], true),
            ChannelDef::new("Speed Feedback", vec![0x0042], true),
            ChannelDef::new("Position Error", vec![0x0043, 0x0044], true),
            ChannelDef::new("Torque Current", vec![0x0045], true),
            ChannelDef::new("Bus Voltage", vec![0x0046], false),
        ];

        Self {
            model: DriveModel::V5,
            groups,
            channels,
        }
    }
}
