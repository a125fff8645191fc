use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};
use crate::drivers::bands::{FilterBank, FilterBankSettings, PowerWindow};
use crate::drivers::error::DriverError;
use crate::drivers::WindowFrame;
use crate::types::CycleReport;
/// Which signal feeds the band filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representative {
    /// One channel by zero-based index.
    Channel(usize),
    /// Sample-wise mean over all channels.
    Average,
}
impl Default for Representative {
    fn default() -> Self {
        Representative::Channel(0)
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    pub representative: Representative,
    pub window: PowerWindow,
    /// Extract bands from the visually smoothed trace instead of the raw one.
    pub smooth_before_bands: bool,
}
impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            representative: Representative::default(),
            window: PowerWindow::Full,
            smooth_before_bands: true,
        }
    }
}
/// Turns each completed 2W window into a [`CycleReport`].
pub struct BandPipeline {
    bank: FilterBank,
    power: PowerSettings,
    cycles: u64,
}
impl BandPipeline {
    /// All filters are designed here; invalid cutoffs never reach acquisition.
    pub fn new(
        filters: &FilterBankSettings,
        power: PowerSettings,
        sample_rate_hz: f64,
    ) -> Result<Self, DriverError> {
        Ok(Self {
            bank: FilterBank::new(filters, sample_rate_hz)?,
            power,
            cycles: 0,
        })
    }
    pub fn process(&mut self, frame: &WindowFrame) -> Result<CycleReport, DriverError> {
        if frame.samples.is_empty() {
            return Err(DriverError::ChannelMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let smoothed_full: Vec<Vec<f64>> = frame
            .samples
            .iter()
            .map(|channel| self.bank.smooth(channel))
            .collect();
        let source = if self.power.smooth_before_bands {
            &smoothed_full
        } else {
            &frame.samples
        };
        let representative = pick_representative(source, self.power.representative)?;
        let measure_len = match self.power.window {
            PowerWindow::Full => representative.len(),
            PowerWindow::Trimmed => frame.window,
        };
        let band_power = self.bank.band_powers(&representative, measure_len);
        let smoothed = smoothed_full
            .iter()
            .map(|c| c[c.len().saturating_sub(frame.window)..].to_vec())
            .collect();
        let trace_start = representative.len().saturating_sub(frame.window);
        self.cycles += 1;
        Ok(CycleReport {
            cycle: self.cycles,
            timestamp: unix_seconds(),
            sample_rate_hz: frame.sample_rate_hz,
            channel_labels: frame.channel_labels.clone(),
            band_power,
            dominant: band_power.dominant(),
            smoothed,
            representative: representative[trace_start..].to_vec(),
            last_samples: frame.last_row(),
        })
    }
}
fn pick_representative(
    channels: &[Vec<f64>],
    choice: Representative,
) -> Result<Vec<f64>, DriverError> {
    match choice {
        Representative::Channel(index) => {
            channels
                .get(index)
                .cloned()
                .ok_or(DriverError::ChannelMismatch {
                    expected: index + 1,
                    actual: channels.len(),
                })
        }
        Representative::Average => {
            let len = channels.first().map(|c| c.len()).unwrap_or(0);
            let count = channels.len() as f64;
            Ok((0..len)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f64>() / count)
                .collect())
        }
    }
}
pub fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
