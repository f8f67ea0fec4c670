//! On-demand parameter access
//!
//! Reads and writes individual configuration registers outside the polling
//! tick. Writes go through the drive's write-select address window and are
//! confirmed with a read-back the firmware needs before the value survives
//! a power cycle. Every call is a single attempt; retry policy belongs to
//! the caller.

use std::sync::Arc;

use drive_catalog::{ParameterDescriptor, ParameterGroup};
use drive_link::{codec, RegisterLink, WRITE_SELECT};
use errors::DriveResult;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Settle time between a register write and its confirming read-back
const WRITE_SETTLE: Duration = Duration::from_millis(10);

/// A parameter's current value as read from the drive
#[derive(Debug, Clone)]
pub struct ParameterValue<'a> {
    pub descriptor: &'a ParameterDescriptor,
    /// Sign-decoded 16-bit register value
    pub raw: i32,
    /// Scaled engineering value, `raw / 10^decimal_places`
    pub value: f64,
}

/// Interactive register access for tuning and bulk load/save
pub struct ParameterStore {
    link: Arc<dyn RegisterLink>,
}

impl ParameterStore {
    pub fn new(link: Arc<dyn RegisterLink>) -> Self {
        Self { link }
    }

    /// Read one parameter and scale it for display.
    ///
    /// The catalog has no signed flag; a parameter whose factory default is
    /// negative is decoded as signed 16-bit. This mirrors the vendor
    /// tooling's behavior and is kept as-is.
    pub async fn read_parameter<'a>(
        &self,
        descriptor: &'a ParameterDescriptor,
    ) -> DriveResult<ParameterValue<'a>> {
        let word = self.link.read_register(descriptor.address).await?;
        let signed = descriptor.default_value < 0.0;
        let raw = codec::decode_u16(word, signed) as i32;
        let value = codec::apply_scale(i64::from(raw), descriptor.decimal_places);
        debug!(
            "read {} (0x{:04X}): word=0x{:04X} raw={} value={}",
            descriptor.code, descriptor.address, word, raw, value
        );
        Ok(ParameterValue {
            descriptor,
            raw,
            value,
        })
    }

    /// Write one parameter from its scaled engineering value.
    pub async fn write_parameter(
        &self,
        descriptor: &ParameterDescriptor,
        value: f64,
    ) -> DriveResult<()> {
        let raw = codec::unscale(value, descriptor.decimal_places)?;
        debug!(
            "write {} = {} (raw {}) to 0x{:04X}",
            descriptor.code, value, raw, descriptor.address
        );
        self.write_raw(descriptor.address, raw).await
    }

    /// Write a raw register value through the write-select window.
    ///
    /// The read-back afterwards is what makes the value stick across power
    /// cycles; its result is intentionally discarded.
    pub async fn write_raw(&self, address: u16, raw: i32) -> DriveResult<()> {
        let word = codec::to_write_word(raw)?;
        let target = address | WRITE_SELECT;
        self.link.write_register(target, word).await?;
        sleep(WRITE_SETTLE).await;
        self.link.read_register(target).await?;
        Ok(())
    }

    /// Read every parameter in a group, best effort: items that fail are
    /// logged and skipped, the rest of the group is still read.
    pub async fn read_group<'a>(&self, group: &'a ParameterGroup) -> Vec<ParameterValue<'a>> {
        let mut values = Vec::with_capacity(group.parameters.len());
        for descriptor in &group.parameters {
            match self.read_parameter(descriptor).await {
                Ok(value) => values.push(value),
                Err(e) => warn!("reading {} failed: {}", descriptor.code, e),
            }
        }
        values
    }
}
