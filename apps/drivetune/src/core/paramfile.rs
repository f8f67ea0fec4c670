//! Parameter snapshot files
//!
//! Serializes a grouped parameter snapshot to an indented JSON document and
//! loads it back, tolerating files written by versions with fewer optional
//! fields. Each record stores the decimal-place count next to the value, so
//! the raw register word reconstructs exactly without consulting the
//! catalog.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use drive_link::codec;
use errors::{DriveError, DriveResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::params::{ParameterStore, ParameterValue};

/// One parameter record, one field per displayed column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Short parameter code; the replay filter key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Register address as a hex string, e.g. `0x0085`
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Scaled engineering value as displayed
    pub value: f64,
    /// Decimal places the value was captured with; 0 when absent
    #[serde(default)]
    pub decimal_place: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterRecord {
    pub fn from_value(value: &ParameterValue<'_>) -> Self {
        let descriptor = value.descriptor;
        Self {
            code: Some(descriptor.code.clone()),
            address: format!("0x{:04X}", descriptor.address),
            name: Some(descriptor.name.clone()),
            value: value.value,
            decimal_place: descriptor.decimal_places,
            default: Some(descriptor.default_value),
            unit: descriptor.unit.clone(),
            description: Some(descriptor.description.clone()),
        }
    }

    /// Parse the stored hex address.
    pub fn parse_address(&self) -> DriveResult<u16> {
        let text = self.address.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u16::from_str_radix(digits, 16)
            .map_err(|e| DriveError::parse(self.address.clone(), e))
    }

    /// Reconstruct the raw register value this record was captured from.
    pub fn raw_value(&self) -> DriveResult<i32> {
        codec::unscale(self.value, self.decimal_place)
    }
}

/// All parameters of one group, in display order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group: String,
    pub parameters: Vec<ParameterRecord>,
}

/// A full parameter snapshot document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterFile {
    pub groups: Vec<GroupRecord>,
}

impl ParameterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group's read results to the snapshot.
    pub fn push_group(&mut self, name: &str, values: &[ParameterValue<'_>]) {
        self.groups.push(GroupRecord {
            group: name.to_string(),
            parameters: values.iter().map(ParameterRecord::from_value).collect(),
        });
    }

    /// Render the snapshot as an indented JSON document. Output is
    /// deterministic for identical input.
    pub fn to_json(&self) -> DriveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot document. Optional fields may be absent; a
    /// structurally invalid document is a parse error.
    pub fn from_json(text: &str) -> DriveResult<Self> {
        serde_json::from_str(text).map_err(|e| DriveError::parse("parameter file", e))
    }

    pub fn save(&self, path: &Path) -> DriveResult<()> {
        fs::write(path, self.to_json()?)?;
        info!("parameter snapshot saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> DriveResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Total number of records across all groups.
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.parameters.len()).sum()
    }
}

/// Outcome of replaying a snapshot onto the drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Replay a snapshot through the parameter store's write path.
///
/// With `allow_codes` set, only records whose code is in the list are
/// written; everything else is skipped untouched (the gains-only load). A
/// record that fails conversion or transport is reported and the batch
/// carries on with the next one.
pub async fn apply(
    store: &ParameterStore,
    file: &ParameterFile,
    allow_codes: Option<&HashSet<String>>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    for group in &file.groups {
        for record in &group.parameters {
            if let Some(allowed) = allow_codes {
                match record.code.as_deref() {
                    Some(code) if allowed.contains(code) => {},
                    _ => {
                        report.skipped += 1;
                        continue;
                    },
                }
            }
            match apply_record(store, record).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!("applying {} failed: {}", record.address, e);
                    report.failed += 1;
                },
            }
        }
    }
    info!(
        "snapshot applied: {} written, {} skipped, {} failed",
        report.written, report.skipped, report.failed
    );
    report
}

async fn apply_record(store: &ParameterStore, record: &ParameterRecord) -> DriveResult<()> {
    let address = record.parse_address()?;
    let raw = record.raw_value()?;
    store.write_raw(address, raw).await
}
