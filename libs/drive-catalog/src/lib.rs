//! Static drive catalog and session settings
//!
//! The catalog is the immutable per-model table of configuration parameters
//! and telemetry channels, resolved once at model selection. Session
//! settings carry the mutable per-channel display state between runs.

pub mod catalog;
pub mod settings;

pub use catalog::{ChannelDef, DriveCatalog, DriveModel, ParameterDescriptor, ParameterGroup};
pub use settings::{ChannelSettings, SessionSettings, WindowGeometry};
