// Commandline argument parser using clap for pieeg-bands

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::types::SourceKind;

#[derive(Debug, Parser, Clone, Default)]
#[clap(version, about)]
pub struct BandArgs {
    /// JSON configuration file; missing fields fall back to defaults
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Where frames come from: the PiEEG shield or the built-in simulator
    #[arg(short = 's', long = "source", value_enum)]
    pub source: Option<SourceKind>,

    /// Number of chained ADS1299 devices (1 or 2)
    #[arg(short = 'd', long = "devices")]
    pub devices: Option<usize>,

    /// UDP telemetry destination, as HOST:PORT
    #[arg(long = "udp")]
    pub udp: Option<String>,

    /// Disable UDP telemetry entirely
    #[arg(long = "no-udp", conflicts_with = "udp")]
    pub no_udp: bool,

    /// Path of the per-cycle JSON snapshot
    #[arg(long = "snapshot")]
    pub snapshot: Option<PathBuf>,

    /// Append per-cycle band powers to this CSV file
    #[arg(long = "history")]
    pub history: Option<PathBuf>,

    /// Write waveform and spectrum PNGs into this directory every cycle
    #[arg(long = "plot-dir")]
    pub plot_dir: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(short = 'n', long = "cycles")]
    pub cycles: Option<u64>,

    /// Pace the simulator to the sample clock
    #[arg(long = "realtime")]
    pub realtime: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long = "print-config")]
    pub print_config: bool,
}

impl BandArgs {
    /// Command line values win over the configuration file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(source) = self.source {
            config.acquisition.source = source;
        }
        if let Some(devices) = self.devices {
            config.acquisition.devices = devices;
        }
        if self.no_udp {
            config.telemetry.udp_target = None;
        } else if let Some(udp) = &self.udp {
            config.telemetry.udp_target = Some(udp.clone());
        }
        if let Some(path) = &self.snapshot {
            config.telemetry.snapshot_path = Some(path.clone());
        }
        if let Some(path) = &self.history {
            config.telemetry.history_path = Some(path.clone());
        }
        if let Some(dir) = &self.plot_dir {
            config.telemetry.plot_dir = Some(dir.clone());
        }
        if self.realtime {
            config.acquisition.simulation.realtime = true;
        }
    }
}
