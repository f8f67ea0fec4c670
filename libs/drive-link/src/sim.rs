//! Simulated drive link
//!
//! Stands in for real hardware when no serial port is available. Registers
//! hold their last written value (callers seed catalog defaults), and reads
//! of unseeded addresses return small randomized words so telemetry stays
//! alive in the disconnected/demo state.

use std::collections::HashMap;

use async_trait::async_trait;
use errors::DriveResult;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::link::RegisterLink;

/// In-memory register map with randomized fallback reads.
#[derive(Default)]
pub struct SimulatedLink {
    registers: Mutex<HashMap<u16, u16>>,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link preloaded with register values.
    pub fn with_registers(seed: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            registers: Mutex::new(seed.into_iter().collect()),
        }
    }

    /// Preload or overwrite a register value.
    pub async fn set_register(&self, address: u16, value: u16) {
        self.registers.lock().await.insert(address, value);
    }

    fn synthetic_word() -> u16 {
        rand::thread_rng().gen_range(0..=200)
    }
}

#[async_trait]
impl RegisterLink for SimulatedLink {
    async fn read_register(&self, address: u16) -> DriveResult<u16> {
        let registers = self.registers.lock().await;
        Ok(registers
            .get(&address)
            .copied()
            .unwrap_or_else(Self::synthetic_word))
    }

    async fn read_registers(&self, address: u16, count: u16) -> DriveResult<Vec<u16>> {
        let registers = self.registers.lock().await;
        Ok((0..count)
            .map(|offset| {
                registers
                    .get(&(address + offset))
                    .copied()
                    .unwrap_or_else(Self::synthetic_word)
            })
            .collect())
    }

    async fn write_register(&self, address: u16, value: u16) -> DriveResult<()> {
        debug!("simulated write 0x{:04X} = 0x{:04X}", address, value);
        self.registers.lock().await.insert(address, value);
        Ok(())
    }
}
