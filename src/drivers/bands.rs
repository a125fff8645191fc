//! Brainwave band definitions and the filter bank that turns a 2W window
//! into a smoothed trace and four band powers.
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::drivers::filter::{ButterworthFilter, FilterSpec};
use crate::drivers::DriverError;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Theta,
    Alpha,
    Beta,
    Gamma,
}
impl Band {
    pub const ALL: [Band; 4] = [Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];
    pub fn label(&self) -> &'static str {
        match self {
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
}
impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
/// Mean squared amplitude per band for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BandPower {
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}
impl BandPower {
    pub fn new(theta: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            theta,
            alpha,
            beta,
            gamma,
        }
    }
    pub fn get(&self, band: Band) -> f64 {
        match band {
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }
    fn set(&mut self, band: Band, value: f64) {
        match band {
            Band::Theta => self.theta = value,
            Band::Alpha => self.alpha = value,
            Band::Beta => self.beta = value,
            Band::Gamma => self.gamma = value,
        }
    }
    pub fn total(&self) -> f64 {
        self.theta + self.alpha + self.beta + self.gamma
    }
    /// Band with the highest power; the earliest band wins a tie.
    pub fn dominant(&self) -> Band {
        Band::ALL
            .into_iter()
            .fold(Band::Theta, |best, band| {
                if self.get(band) > self.get(best) {
                    band
                } else {
                    best
                }
            })
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandEdges {
    pub low_hz: f64,
    pub high_hz: f64,
}
impl BandEdges {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterBankSettings {
    pub highpass_hz: f64,
    pub highpass_order: usize,
    pub lowpass_hz: f64,
    pub lowpass_order: usize,
    pub band_order: usize,
    pub theta: BandEdges,
    pub alpha: BandEdges,
    pub beta: BandEdges,
    pub gamma: BandEdges,
}
impl Default for FilterBankSettings {
    fn default() -> Self {
        Self {
            highpass_hz: 1.0,
            highpass_order: 3,
            lowpass_hz: 10.0,
            lowpass_order: 5,
            band_order: 5,
            theta: BandEdges::new(4.0, 8.0),
            alpha: BandEdges::new(8.0, 12.0),
            beta: BandEdges::new(13.0, 30.0),
            gamma: BandEdges::new(30.0, 100.0),
        }
    }
}
impl FilterBankSettings {
    pub fn edges(&self, band: Band) -> BandEdges {
        match band {
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }
}
/// Which part of the 2W window the band power is averaged over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerWindow {
    /// All 2W samples, warm-up half included.
    #[default]
    Full,
    /// Only the newest W samples, like the plotted trace.
    Trimmed,
}
/// The fixed set of designed filters shared by every channel.
#[derive(Clone, Debug)]
pub struct FilterBank {
    highpass: ButterworthFilter,
    lowpass: ButterworthFilter,
    bands: Vec<(Band, ButterworthFilter)>,
}
impl FilterBank {
    /// Designs every filter up front so bad cutoffs surface before acquisition.
    pub fn new(settings: &FilterBankSettings, sample_rate_hz: f64) -> Result<Self, DriverError> {
        let highpass = FilterSpec::highpass(
            "visual highpass",
            settings.highpass_hz,
            sample_rate_hz,
            settings.highpass_order,
        )
        .design()?;
        let lowpass = FilterSpec::lowpass(
            "visual lowpass",
            settings.lowpass_hz,
            sample_rate_hz,
            settings.lowpass_order,
        )
        .design()?;
        let bands = Band::ALL
            .into_iter()
            .map(|band| {
                let edges = settings.edges(band);
                FilterSpec::bandpass(
                    band.label(),
                    edges.low_hz,
                    edges.high_hz,
                    sample_rate_hz,
                    settings.band_order,
                )
                .design()
                .map(|filter| (band, filter))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            highpass,
            lowpass,
            bands,
        })
    }
    /// Zero-phase high-pass followed by causal low-pass, as drawn on screen.
    pub fn smooth(&self, samples: &[f64]) -> Vec<f64> {
        self.lowpass.apply(&self.highpass.apply(samples))
    }
    /// Band-filters the whole sequence, then averages the squared output over
    /// the last `measure_len` samples (or all of them if shorter).
    pub fn band_powers(&self, samples: &[f64], measure_len: usize) -> BandPower {
        let mut power = BandPower::default();
        for (band, filter) in &self.bands {
            let filtered = filter.apply(samples);
            let start = filtered.len().saturating_sub(measure_len);
            power.set(*band, mean_square(&filtered[start..]));
        }
        power
    }
}
pub fn mean_square(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|v| v * v).sum::<f64>() / samples.len() as f64
}
