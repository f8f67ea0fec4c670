//! Command-line interface
//!
//! Operational surface over the engine: list channels, run the monitor,
//! read and write parameters, export and load snapshots. Bulk load/save
//! run synchronously and never overlap a polling tick; the monitor and the
//! parameter commands use the link one at a time.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use drive_catalog::{DriveCatalog, DriveModel, SessionSettings};
use drive_link::{codec, RegisterLink, RtuLink, SimulatedLink};
use errors::{DriveError, DriveResult};
use tokio::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::monitor::MonitorEngine;
use crate::core::paramfile::{self, ParameterFile};
use crate::core::params::ParameterStore;

#[derive(Parser)]
#[command(name = "drivetune")]
#[command(about = "Servo drive tuning and telemetry over Modbus-RTU")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial device override
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Drive model override (v5 or v6)
    #[arg(long, global = true)]
    pub model: Option<DriveModel>,

    /// Talk to a simulated drive instead of a serial port
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the telemetry channels of the selected model
    Channels,
    /// Poll active channels for a while and print the sampled values
    Monitor {
        /// Seconds to keep polling
        #[arg(long, default_value_t = 5)]
        seconds: u64,
        /// Channel names to activate (default: the saved session settings)
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Samples to print per channel when done
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
    /// Read parameters, all groups or a single one
    Params {
        #[arg(long)]
        group: Option<String>,
    },
    /// Write one parameter by code
    Write { code: String, value: String },
    /// Read every group and save a parameter snapshot
    Export { file: PathBuf },
    /// Load a snapshot and replay it onto the drive
    Load {
        file: PathBuf,
        /// Only write gain-relevant parameters (take effect without a
        /// power cycle)
        #[arg(long)]
        gains_only: bool,
    },
}

pub async fn run(cli: Cli) -> DriveResult<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(port) = &cli.port {
        config.serial.device.clone_from(port);
    }
    let simulate = cli.simulate;
    let catalog = DriveCatalog::for_model(config.model);

    match cli.command {
        Command::Channels => {
            let settings = SessionSettings::load(&config.settings_path)?;
            for channel in &catalog.channels {
                let state = settings.channel(&channel.name);
                let registers: Vec<String> = channel
                    .registers
                    .iter()
                    .map(|r| format!("0x{r:04X}"))
                    .collect();
                println!(
                    "{:<20} registers [{}]{}{}",
                    channel.name,
                    registers.join(", "),
                    if channel.signed { ", signed" } else { "" },
                    if state.active { ", active" } else { "" },
                );
            }
            Ok(())
        },
        Command::Monitor {
            seconds,
            channels,
            tail,
        } => run_monitor(simulate, &config, &catalog, seconds, &channels, tail).await,
        Command::Params { group } => {
            let store = ParameterStore::new(open_link(simulate, &config, &catalog).await?);
            let groups: Vec<_> = match &group {
                Some(name) => vec![catalog.group(name).ok_or_else(|| {
                    DriveError::Configuration(format!("unknown parameter group: {name}"))
                })?],
                None => catalog.groups.iter().collect(),
            };
            for group in groups {
                println!("[{}]", group.name);
                for value in store.read_group(group).await {
                    let unit = value.descriptor.unit.as_deref().unwrap_or("");
                    println!(
                        "  {:<5} 0x{:04X}  {:<32} {:>10} {}",
                        value.descriptor.code,
                        value.descriptor.address,
                        value.descriptor.name,
                        format_scaled(value.value, value.descriptor.decimal_places),
                        unit,
                    );
                }
            }
            Ok(())
        },
        Command::Write { code, value } => {
            let descriptor = catalog.find_parameter(&code).ok_or_else(|| {
                DriveError::Configuration(format!("unknown parameter code: {code}"))
            })?;
            let value = codec::parse_number(&value)?;
            let store = ParameterStore::new(open_link(simulate, &config, &catalog).await?);
            store.write_parameter(descriptor, value).await?;
            info!("{} = {} written", descriptor.code, value);
            Ok(())
        },
        Command::Export { file } => {
            let store = ParameterStore::new(open_link(simulate, &config, &catalog).await?);
            let mut snapshot = ParameterFile::new();
            for group in &catalog.groups {
                let values = store.read_group(group).await;
                snapshot.push_group(&group.name, &values);
            }
            snapshot.save(&file)?;
            info!(
                "{} parameters exported to {}",
                snapshot.record_count(),
                file.display()
            );
            Ok(())
        },
        Command::Load { file, gains_only } => {
            let snapshot = ParameterFile::load(&file)?;
            let store = ParameterStore::new(open_link(simulate, &config, &catalog).await?);
            let allow = gains_only.then(|| catalog.gain_relevant_codes());
            let report = paramfile::apply(&store, &snapshot, allow.as_ref()).await;
            if report.failed > 0 {
                warn!("{} parameters could not be written", report.failed);
            }
            Ok(())
        },
    }
}

/// Open the link the parameter commands talk over. With `--simulate` the
/// drive is an in-memory register map seeded from the catalog defaults.
async fn open_link(
    simulate: bool,
    config: &AppConfig,
    catalog: &DriveCatalog,
) -> DriveResult<Arc<dyn RegisterLink>> {
    if simulate {
        let link = SimulatedLink::with_registers(seed_registers(catalog));
        info!("using simulated drive ({} model)", catalog.model);
        return Ok(Arc::new(link));
    }
    let link = RtuLink::open(config.serial.clone())?;
    // Confirm the drive answers before any command touches it
    if let Some(first) = catalog.groups.first().and_then(|g| g.parameters.first()) {
        link.probe(first.address).await?;
    }
    Ok(Arc::new(link))
}

/// Catalog defaults as raw register words, for seeding the simulator.
fn seed_registers(catalog: &DriveCatalog) -> Vec<(u16, u16)> {
    let mut seed = Vec::new();
    for group in &catalog.groups {
        for p in &group.parameters {
            let raw = match codec::unscale(p.default_value, p.decimal_places) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            if let Ok(word) = codec::to_write_word(raw) {
                seed.push((p.address, word));
            }
        }
    }
    seed
}

async fn run_monitor(
    simulate: bool,
    config: &AppConfig,
    catalog: &DriveCatalog,
    seconds: u64,
    channels: &[String],
    tail: usize,
) -> DriveResult<()> {
    // Monitoring works without a drive: a failed port open drops to the
    // disconnected demo state instead of aborting.
    let link: Option<Arc<dyn RegisterLink>> = if simulate {
        info!("monitoring without a drive, values are synthetic");
        None
    } else {
        match RtuLink::open(config.serial.clone()) {
            Ok(link) => Some(Arc::new(link)),
            Err(e) => {
                warn!("running disconnected: {}", e);
                None
            },
        }
    };

    let engine = MonitorEngine::new(link, catalog.channels.clone(), config.tick_interval());
    if channels.is_empty() {
        let settings = SessionSettings::load(&config.settings_path)?;
        engine.apply_settings(&settings).await;
    } else {
        for name in channels {
            if !engine.set_active(name, true).await {
                warn!("unknown channel: {}", name);
            }
        }
    }
    if engine.active_channel_names().await.is_empty() {
        info!("no channels active, activating all");
        for channel in &catalog.channels {
            engine.set_active(&channel.name, true).await;
        }
    }

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    engine.stop().await;

    let stats = engine.stats().await;
    println!(
        "{} ticks ({} ok, {} failed), {} samples",
        stats.total_ticks, stats.successful_ticks, stats.failed_ticks, stats.samples_appended
    );
    for name in engine.active_channel_names().await {
        if let Some(history) = engine.history(&name).await {
            let shown: Vec<String> = history.iter().take(tail).map(|v| v.to_string()).collect();
            println!("{:<20} [{}] ({} samples)", name, shown.join(", "), history.len());
        }
    }
    Ok(())
}

fn format_scaled(value: f64, decimal_places: u32) -> String {
    format!("{:.*}", decimal_places as usize, value)
}
