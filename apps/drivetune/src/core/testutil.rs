//! Shared test double for the register link

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use drive_link::RegisterLink;
use errors::{DriveError, DriveResult};
use tokio::sync::Mutex;

/// In-memory link that records every call and can inject device faults.
#[derive(Default)]
pub(crate) struct MockLink {
    pub registers: Mutex<HashMap<u16, u16>>,
    pub fail: AtomicBool,
    /// Recorded (start, count) of every block read
    pub read_calls: Mutex<Vec<(u16, u16)>>,
    /// Recorded (address, value) of every write
    pub writes: Mutex<Vec<(u16, u16)>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registers(seed: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            registers: Mutex::new(seed.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn check_fault(&self) -> DriveResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(DriveError::device("injected fault"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RegisterLink for MockLink {
    async fn read_register(&self, address: u16) -> DriveResult<u16> {
        self.check_fault()?;
        let registers = self.registers.lock().await;
        Ok(registers.get(&address).copied().unwrap_or(0))
    }

    async fn read_registers(&self, address: u16, count: u16) -> DriveResult<Vec<u16>> {
        self.check_fault()?;
        self.read_calls.lock().await.push((address, count));
        let registers = self.registers.lock().await;
        Ok((0..count)
            .map(|offset| registers.get(&(address + offset)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_register(&self, address: u16, value: u16) -> DriveResult<()> {
        self.check_fault()?;
        self.writes.lock().await.push((address, value));
        self.registers.lock().await.insert(address, value);
        Ok(())
    }
}
