//! Core engine: telemetry monitor, parameter store and snapshot files

pub mod monitor;
pub mod paramfile;
pub mod params;

#[cfg(test)]
pub(crate) mod testutil;
