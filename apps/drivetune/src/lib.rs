//! drivetune
//!
//! Inspect and tune servo drive configuration registers and watch selected
//! telemetry channels in real time over a Modbus-RTU serial link.

pub mod cli;
pub mod config;
pub mod core;

pub use config::AppConfig;
