use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::drivers::frame::{RawFrame, CHANNELS_PER_DEVICE, FULL_SCALE, REFERENCE_VOLTS};
use crate::drivers::DriverError;
/// Register-level view of a chain of ADS1299 devices.
pub trait AcquisitionBoard {
    fn name(&self) -> &str;
    fn device_count(&self) -> usize;
    /// Current level of the shared data-ready line (`true` = high).
    fn data_ready(&mut self) -> Result<bool, DriverError>;
    /// Reads one frame from every device, in chain order, for the same tick.
    fn read_frames(&mut self) -> Result<Vec<RawFrame>, DriverError>;
    fn channel_count(&self) -> usize {
        self.device_count() * CHANNELS_PER_DEVICE
    }
}
impl<B: AcquisitionBoard + ?Sized> AcquisitionBoard for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn device_count(&self) -> usize {
        (**self).device_count()
    }
    fn data_ready(&mut self) -> Result<bool, DriverError> {
        (**self).data_ready()
    }
    fn read_frames(&mut self) -> Result<Vec<RawFrame>, DriverError> {
        (**self).read_frames()
    }
}
#[derive(Clone, Copy, Debug)]
enum ReadyLine {
    Toggling(bool),
    Stuck(bool),
}
/// In-memory board replaying scripted frame sets, one per data-ready pulse.
pub struct ManualBoard {
    devices: usize,
    ticks: VecDeque<Vec<RawFrame>>,
    line: ReadyLine,
}
impl ManualBoard {
    pub fn new(devices: usize, ticks: impl IntoIterator<Item = Vec<RawFrame>>) -> Self {
        Self {
            devices,
            ticks: ticks.into_iter().collect(),
            line: ReadyLine::Toggling(false),
        }
    }
    /// A board whose data-ready line never changes level.
    pub fn stuck(devices: usize, level: bool) -> Self {
        Self {
            devices,
            ticks: VecDeque::new(),
            line: ReadyLine::Stuck(level),
        }
    }
}
impl AcquisitionBoard for ManualBoard {
    fn name(&self) -> &str {
        "manual"
    }
    fn device_count(&self) -> usize {
        self.devices
    }
    fn data_ready(&mut self) -> Result<bool, DriverError> {
        match &mut self.line {
            ReadyLine::Stuck(level) => Ok(*level),
            ReadyLine::Toggling(level) => {
                *level = !*level;
                Ok(*level)
            }
        }
    }
    fn read_frames(&mut self) -> Result<Vec<RawFrame>, DriverError> {
        self.ticks
            .pop_front()
            .ok_or_else(|| DriverError::device_io("manual board", "no scripted frames left"))
    }
}
/// One sinusoidal component of the synthetic signal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub freq_hz: f64,
    pub amplitude_uv: f64,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub tones: Vec<Tone>,
    pub noise_uv: f64,
    /// Probability that a tick's gating frame carries a bad status word.
    pub corrupt_rate: f64,
    /// Sleep between ticks to follow the sample clock.
    pub realtime: bool,
    pub seed: Option<u64>,
}
impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tones: vec![
                Tone {
                    freq_hz: 6.0,
                    amplitude_uv: 8.0,
                },
                Tone {
                    freq_hz: 10.0,
                    amplitude_uv: 20.0,
                },
                Tone {
                    freq_hz: 21.0,
                    amplitude_uv: 5.0,
                },
            ],
            noise_uv: 2.0,
            corrupt_rate: 0.0,
            realtime: false,
            seed: None,
        }
    }
}
/// Synthetic PiEEG producing well-formed frames from tone mixtures.
pub struct SimulatedBoard {
    devices: usize,
    sample_rate_hz: f64,
    settings: SimulationSettings,
    rng: StdRng,
    tick: u64,
    level: bool,
    next_deadline: Instant,
}
impl SimulatedBoard {
    pub fn new(devices: usize, sample_rate_hz: f64, settings: SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            devices,
            sample_rate_hz,
            settings,
            rng,
            tick: 0,
            level: false,
            next_deadline: Instant::now(),
        }
    }
    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }
    fn sample_uv(&mut self, channel: usize) -> f64 {
        let t = self.tick as f64 / self.sample_rate_hz;
        // Channels share the tones but drift apart in phase.
        let phase = channel as f64 * 0.35;
        let mut value: f64 = self
            .settings
            .tones
            .iter()
            .map(|tone| tone.amplitude_uv * (TAU * tone.freq_hz * t + phase).sin())
            .sum();
        if self.settings.noise_uv > 0.0 {
            value += self.rng.gen_range(-1.0..1.0) * self.settings.noise_uv;
        }
        value
    }
}
pub fn microvolts_to_code(uv: f64) -> i32 {
    (uv * FULL_SCALE / (1_000_000.0 * REFERENCE_VOLTS)).round() as i32
}
impl AcquisitionBoard for SimulatedBoard {
    fn name(&self) -> &str {
        "simulated"
    }
    fn device_count(&self) -> usize {
        self.devices
    }
    fn data_ready(&mut self) -> Result<bool, DriverError> {
        if self.level && self.settings.realtime {
            let now = Instant::now();
            if now < self.next_deadline {
                thread::sleep(self.next_deadline - now);
            }
            let period = self.period();
            self.next_deadline += period;
        }
        self.level = !self.level;
        Ok(self.level)
    }
    fn read_frames(&mut self) -> Result<Vec<RawFrame>, DriverError> {
        let mut frames = Vec::with_capacity(self.devices);
        for device in 0..self.devices {
            let mut codes = [0i32; CHANNELS_PER_DEVICE];
            for (i, code) in codes.iter_mut().enumerate() {
                *code = microvolts_to_code(self.sample_uv(device * CHANNELS_PER_DEVICE + i));
            }
            frames.push(RawFrame::from_codes(&codes));
        }
        let corrupt_rate = self.settings.corrupt_rate;
        if corrupt_rate > 0.0 && self.rng.gen_bool(corrupt_rate.min(1.0)) {
            if let Some(gate) = frames.pop() {
                let mut bytes = gate.as_bytes().to_vec();
                bytes[0] = 0x00;
                frames.push(RawFrame::new(bytes));
            }
        }
        self.tick += 1;
        Ok(frames)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::frame::decode_tick;
    #[test]
    fn manual_board_toggles_and_replays() {
        let frame = RawFrame::from_codes(&[0; 8]);
        let mut board = ManualBoard::new(1, vec![vec![frame.clone()]]);
        assert!(board.data_ready().unwrap());
        assert!(!board.data_ready().unwrap());
        assert_eq!(board.read_frames().unwrap(), vec![frame]);
        assert!(board.read_frames().unwrap_err().is_fatal());
    }
    #[test]
    fn simulated_frames_decode_to_the_tone_mixture() {
        let settings = SimulationSettings {
            tones: vec![Tone {
                freq_hz: 10.0,
                amplitude_uv: 50.0,
            }],
            noise_uv: 0.0,
            seed: Some(7),
            ..SimulationSettings::default()
        };
        let mut board = SimulatedBoard::new(2, 250.0, settings);
        assert_eq!(board.channel_count(), 16);
        let mut peak: f64 = 0.0;
        for _ in 0..50 {
            let row = decode_tick(&board.read_frames().unwrap(), 2).unwrap();
            assert_eq!(row.len(), 16);
            peak = peak.max(row[0].abs());
        }
        assert!((peak - 50.0).abs() < 1.0, "peak {peak}");
    }
    #[test]
    fn corrupt_rate_breaks_the_gating_frame() {
        let settings = SimulationSettings {
            corrupt_rate: 1.0,
            seed: Some(1),
            ..SimulationSettings::default()
        };
        let mut board = SimulatedBoard::new(2, 250.0, settings);
        let frames = board.read_frames().unwrap();
        assert!(frames[0].has_valid_status());
        assert!(!frames[1].has_valid_status());
        assert!(decode_tick(&frames, 2).is_err());
    }
    #[test]
    fn microvolt_codes_round_trip_within_one_step() {
        use crate::drivers::frame::code_to_microvolts;
        let half_step = 0.5 * 1_000_000.0 * REFERENCE_VOLTS / FULL_SCALE + 0.005;
        for uv in [-187.5, -4.0, 0.0, 4.0, 100.0, 1234.56] {
            let code = microvolts_to_code(uv);
            let back = code_to_microvolts(code);
            assert!((back - uv).abs() <= half_step, "{uv} -> {back}");
            assert_eq!(microvolts_to_code(back), code);
        }
        assert_eq!(code_to_microvolts(microvolts_to_code(100.0)), 100.05);
    }
}
