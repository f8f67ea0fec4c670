//! Register link abstraction

use async_trait::async_trait;
use errors::DriveResult;

/// Writes address a register with this bit OR'd in; reads use the bare
/// address. The drive firmware expects the bit on every write (vendor
/// tooling behavior, not documented in the Modbus map).
pub const WRITE_SELECT: u16 = 0x8000;

/// A connection that can read and write 16-bit drive registers.
///
/// Implementations keep one request in flight at a time and serialize
/// access internally. Every call is a single attempt: timeouts live in the
/// transport, retries belong to the caller.
#[async_trait]
pub trait RegisterLink: Send + Sync {
    /// Read a single holding register.
    async fn read_register(&self, address: u16) -> DriveResult<u16>;

    /// Read `count` consecutive holding registers starting at `address`.
    async fn read_registers(&self, address: u16, count: u16) -> DriveResult<Vec<u16>>;

    /// Write a single register.
    async fn write_register(&self, address: u16, value: u16) -> DriveResult<()>;
}
