// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::drivers::bands::{Band, BandPower};

// 采集来源
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    #[value(name = "sim")]
    #[serde(rename = "sim")]
    Simulated,
    Hardware,
}

// 每个周期产出的结果，发给各个输出端
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub timestamp: f64, // unix seconds
    pub sample_rate_hz: f64,
    pub channel_labels: Vec<String>,
    pub band_power: BandPower,
    pub dominant: Band,
    pub smoothed: Vec<Vec<f64>>, // channels x W, newest half of the smoothed window
    pub representative: Vec<f64>, // newest W samples of the band input
    pub last_samples: Vec<f64>,   // last microvolt reading per channel
}

impl CycleReport {
    /// Telemetry value: total band power scaled by 1000 and capped at 10.
    pub fn udp_level(&self) -> f64 {
        (self.band_power.total() * 1000.0).min(10.0)
    }

    pub fn udp_payload(&self) -> String {
        format!("{:.2}", self.udp_level())
    }

    pub fn snapshot(&self) -> Snapshot {
        let label = self.dominant.label().to_owned();
        Snapshot {
            timestamp: self.timestamp,
            theta_power: self.band_power.theta,
            alpha_power: self.band_power.alpha,
            beta_power: self.band_power.beta,
            gamma_power: self.band_power.gamma,
            dominant_wave: label.clone(),
            command: label,
        }
    }
}

// 本地快照文件的 JSON 结构
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub theta_power: f64,
    pub alpha_power: f64,
    pub beta_power: f64,
    pub gamma_power: f64,
    pub dominant_wave: String,
    pub command: String,
}

#[cfg(test)]
pub(crate) fn report_with(power: BandPower) -> CycleReport {
    CycleReport {
        cycle: 1,
        timestamp: 1_700_000_000.5,
        sample_rate_hz: 250.0,
        channel_labels: vec!["Ch1".into(), "Ch2".into()],
        band_power: power,
        dominant: power.dominant(),
        smoothed: vec![vec![0.0; 8], vec![1.0; 8]],
        representative: (0..8).map(|i| (i as f64 * 0.8).sin()).collect(),
        last_samples: vec![0.0, 1.0],
    }
}
