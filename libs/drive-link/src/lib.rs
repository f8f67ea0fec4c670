//! Register link layer for drivetune
//!
//! Pure register word codecs, read-range aggregation, and the link
//! abstraction over which the engine talks to a drive: a Modbus-RTU serial
//! transport for real hardware and a simulated link for offline use.

pub mod aggregate;
pub mod codec;
pub mod link;
pub mod rtu;
pub mod sim;

pub use aggregate::{aggregate_registers, ReadRange};
pub use link::{RegisterLink, WRITE_SELECT};
pub use rtu::{RtuLink, SerialConfig};
pub use sim::SimulatedLink;
