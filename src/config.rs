// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::drivers::frame::CHANNELS_PER_DEVICE;
use crate::drivers::{DriverError, FilterBank, FilterBankSettings, PowerSettings, Representative};
use crate::drivers::source::SimulationSettings;
use crate::types::SourceKind;

pub const DEFAULT_UDP_TARGET: &str = "172.21.128.229:4210";
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/latest_eeg_data.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionSettings,
    pub filters: FilterBankSettings,
    pub power: PowerSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub source: SourceKind,
    pub sample_rate_hz: f64,
    /// Samples per cycle (W). Each cycle filters 2W samples.
    pub window: usize,
    pub devices: usize,
    pub ready_timeout_ms: u64,
    pub poll_interval_us: u64,
    pub spi_paths: Vec<String>,
    pub gpio_chip: String,
    pub chip_select_line: u32,
    pub data_ready_line: u32,
    pub spi_speed_hz: u32,
    pub simulation: SimulationSettings,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::Simulated,
            sample_rate_hz: 250.0,
            window: 250,
            devices: 2,
            ready_timeout_ms: 1000,
            poll_interval_us: 20,
            spi_paths: vec!["/dev/spidev0.0".into(), "/dev/spidev0.1".into()],
            gpio_chip: "/dev/gpiochip0".into(),
            chip_select_line: 19,
            data_ready_line: 26,
            spi_speed_hz: 4_000_000,
            simulation: SimulationSettings::default(),
        }
    }
}

impl AcquisitionSettings {
    pub fn channel_count(&self) -> usize {
        self.devices * CHANNELS_PER_DEVICE
    }

    pub fn channel_labels(&self) -> Vec<String> {
        (1..=self.channel_count()).map(|i| format!("Ch{i}")).collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub udp_target: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub plot_dir: Option<PathBuf>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            udp_target: Some(DEFAULT_UDP_TARGET.into()),
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            history_path: None,
            plot_dir: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, DriverError> {
        serde_json::from_str(text).map_err(|e| DriverError::Config(format!("failed to parse: {e}")))
    }

    pub fn to_json(&self) -> Result<String, DriverError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DriverError::Config(format!("failed to serialize: {e}")))
    }

    /// Checks everything that would otherwise fail mid-acquisition, including
    /// designing the filter bank once.
    pub fn validate(&self) -> Result<(), DriverError> {
        let acq = &self.acquisition;
        if acq.sample_rate_hz <= 0.0 || !acq.sample_rate_hz.is_finite() {
            return Err(DriverError::InvalidSampleRate);
        }
        if acq.window == 0 {
            return Err(DriverError::InvalidWindow);
        }
        if !(1..=2).contains(&acq.devices) {
            return Err(DriverError::Config(format!(
                "devices must be 1 or 2, got {}",
                acq.devices
            )));
        }
        if acq.source == SourceKind::Hardware && acq.spi_paths.len() < acq.devices {
            return Err(DriverError::Config(format!(
                "{} devices need {} SPI paths, got {}",
                acq.devices,
                acq.devices,
                acq.spi_paths.len()
            )));
        }
        let rate = acq.simulation.corrupt_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(DriverError::Config(format!(
                "simulation.corrupt_rate must be within 0..=1, got {rate}"
            )));
        }
        if let Representative::Channel(index) = self.power.representative {
            if index >= acq.channel_count() {
                return Err(DriverError::ChannelMismatch {
                    expected: index + 1,
                    actual: acq.channel_count(),
                });
            }
        }
        FilterBank::new(&self.filters, acq.sample_rate_hz)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{BandEdges, ErrorKind, PowerWindow};

    #[test]
    fn empty_object_yields_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.acquisition.window, 250);
        assert_eq!(config.acquisition.channel_count(), 16);
        assert_eq!(
            config.telemetry.udp_target.as_deref(),
            Some("172.21.128.229:4210")
        );
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = Config::from_json(
            r#"{
                "acquisition": {"devices": 1, "source": "hardware"},
                "power": {"representative": "average", "window": "trimmed"},
                "telemetry": {"udp_target": null}
            }"#,
        )
        .unwrap();
        assert_eq!(config.acquisition.devices, 1);
        assert_eq!(config.acquisition.source, SourceKind::Hardware);
        assert_eq!(config.acquisition.sample_rate_hz, 250.0);
        assert_eq!(config.power.representative, Representative::Average);
        assert_eq!(config.power.window, PowerWindow::Trimmed);
        assert!(config.power.smooth_before_bands);
        assert!(config.telemetry.udp_target.is_none());
        assert_eq!(config.acquisition.channel_labels().last().unwrap(), "Ch8");
    }

    #[test]
    fn channel_representative_round_trips() {
        let config = Config::from_json(r#"{"power": {"representative": {"channel": 3}}}"#).unwrap();
        assert_eq!(config.power.representative, Representative::Channel(3));
        let again = Config::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.acquisition.devices = 3;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let mut config = Config::default();
        config.power.representative = Representative::Channel(16);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filters.alpha = BandEdges::new(12.0, 8.0);
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::FilterDesign);

        let mut config = Config::default();
        config.acquisition.sample_rate_hz = 150.0; // gamma edge above Nyquist
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::FilterDesign);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"acquisition": {"window": 125}}"#).unwrap();
        assert_eq!(Config::load(&path).unwrap().acquisition.window, 125);
    }
}
