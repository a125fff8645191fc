use std::f64::consts::PI;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use crate::drivers::DriverError;
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Lowpass { cutoff_hz: f64 },
    Highpass { cutoff_hz: f64 },
    Bandpass { low_hz: f64, high_hz: f64 },
}
/// How a designed filter is run over a finite buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Forward only, zero initial state.
    Causal,
    /// Forward-backward with odd-extension padding.
    ZeroPhase,
}
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub name: String,
    pub kind: FilterKind,
    pub sample_rate_hz: f64,
    pub order: usize,
    pub phase: Phase,
}
impl FilterSpec {
    pub fn lowpass(name: &str, cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FilterKind::Lowpass { cutoff_hz },
            sample_rate_hz,
            order,
            phase: Phase::Causal,
        }
    }
    pub fn highpass(name: &str, cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FilterKind::Highpass { cutoff_hz },
            sample_rate_hz,
            order,
            phase: Phase::ZeroPhase,
        }
    }
    pub fn bandpass(
        name: &str,
        low_hz: f64,
        high_hz: f64,
        sample_rate_hz: f64,
        order: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: FilterKind::Bandpass { low_hz, high_hz },
            sample_rate_hz,
            order,
            phase: Phase::ZeroPhase,
        }
    }
    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate_hz * 0.5
    }
    pub fn design(&self) -> Result<ButterworthFilter, DriverError> {
        self.validate()?;
        let sections = design_sections(self)?;
        let poles = match self.kind {
            FilterKind::Bandpass { .. } => self.order * 2,
            _ => self.order,
        };
        Ok(ButterworthFilter {
            spec: self.clone(),
            sections,
            poles,
        })
    }
    fn validate(&self) -> Result<(), DriverError> {
        let fail = |reason: String| Err(DriverError::filter_design(self.name.as_str(), reason));
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return fail(format!("sample rate {} Hz is not positive", self.sample_rate_hz));
        }
        if self.order == 0 {
            return fail("order must be at least 1".to_string());
        }
        let nyquist = self.nyquist_hz();
        let check = |hz: f64| -> Result<(), DriverError> {
            if !hz.is_finite() || hz <= 0.0 {
                fail(format!("cutoff {hz} Hz must be positive"))
            } else if hz >= nyquist {
                fail(format!("cutoff {hz} Hz is not below nyquist ({nyquist} Hz)"))
            } else {
                Ok(())
            }
        };
        match self.kind {
            FilterKind::Lowpass { cutoff_hz } | FilterKind::Highpass { cutoff_hz } => {
                check(cutoff_hz)
            }
            FilterKind::Bandpass { low_hz, high_hz } => {
                check(low_hz)?;
                check(high_hz)?;
                if low_hz >= high_hz {
                    return fail(format!("band edges {low_hz}..{high_hz} Hz are not increasing"));
                }
                Ok(())
            }
        }
    }
}
#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}
impl BiquadCoeffs {
    fn process(&self, state: &mut BiquadState, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * y + state.z2;
        state.z2 = self.b2 * input - self.a2 * y;
        y
    }
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
    /// State reached after a constant input of `level` has settled.
    fn steady_state(&self, level: f64) -> BiquadState {
        let y = self.dc_gain() * level;
        BiquadState {
            z1: y - self.b0 * level,
            z2: self.b2 * level - self.a2 * y,
        }
    }
    #[cfg(test)]
    fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (z1 * self.b1 + z2 * self.b2 + self.b0) / (z1 * self.a1 + z2 * self.a2 + 1.0)
    }
}
/// A Butterworth filter realised as cascaded second-order sections.
#[derive(Clone, Debug)]
pub struct ButterworthFilter {
    spec: FilterSpec,
    sections: Vec<BiquadCoeffs>,
    poles: usize,
}
impl ButterworthFilter {
    #[cfg(test)]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
    /// Runs the filter with the phase behaviour of its spec.
    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        match self.spec.phase {
            Phase::Causal => self.lfilter(input),
            Phase::ZeroPhase => self.filtfilt(input),
        }
    }
    pub fn lfilter(&self, input: &[f64]) -> Vec<f64> {
        self.run(input, 0.0)
    }
    /// Forward-backward filtering. The input is padded on both ends with an
    /// odd reflection of `3 * (poles + 1)` samples (clamped to the input
    /// length) and each pass starts from the steady state of its first sample.
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        if input.is_empty() {
            return Vec::new();
        }
        let pad = self.pad_len().min(input.len() - 1);
        let extended = odd_extend(input, pad);
        let forward = self.run(&extended, extended[0]);
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let backward = self.run(&reversed, reversed[0]);
        let mut output: Vec<f64> = backward.into_iter().rev().collect();
        output.truncate(pad + input.len());
        output.drain(..pad);
        output
    }
    /// Magnitude response at `freq_hz`.
    #[cfg(test)]
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / self.spec.sample_rate_hz;
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(omega))
            .norm()
    }
    fn pad_len(&self) -> usize {
        3 * (self.poles + 1)
    }
    fn run(&self, input: &[f64], level: f64) -> Vec<f64> {
        let mut states = self.initial_states(level);
        input
            .iter()
            .map(|&x| {
                self.sections
                    .iter()
                    .zip(states.iter_mut())
                    .fold(x, |value, (section, state)| section.process(state, value))
            })
            .collect()
    }
    fn initial_states(&self, level: f64) -> Vec<BiquadState> {
        let mut scale = level;
        self.sections
            .iter()
            .map(|section| {
                let state = section.steady_state(scale);
                scale *= section.dc_gain();
                state
            })
            .collect()
    }
}
fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let first = input[0];
    let last = input[input.len() - 1];
    let mut out = Vec::with_capacity(input.len() + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=pad).map(|i| 2.0 * last - input[input.len() - 1 - i]));
    out
}
const REAL_EPS: f64 = 1e-10;
/// Analog Butterworth prototype poles on the unit circle (left half plane).
fn prototype_poles(order: usize) -> Vec<Complex64> {
    (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 - (order as f64 - 1.0);
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        })
        .collect()
}
fn design_sections(spec: &FilterSpec) -> Result<Vec<BiquadCoeffs>, DriverError> {
    let n = spec.order;
    let nyquist = spec.nyquist_hz();
    // Pre-warp for the bilinear transform at fs = 2.
    let warp = |hz: f64| 4.0 * (PI * (hz / nyquist) / 2.0).tan();
    let proto = prototype_poles(n);
    let origin = Complex64::new(0.0, 0.0);
    let (zeros, poles, gain): (Vec<Complex64>, Vec<Complex64>, f64) = match spec.kind {
        FilterKind::Lowpass { cutoff_hz } => {
            let wo = warp(cutoff_hz);
            let poles = proto.iter().map(|&p| p * wo).collect();
            (Vec::new(), poles, wo.powi(n as i32))
        }
        FilterKind::Highpass { cutoff_hz } => {
            let wo = warp(cutoff_hz);
            let poles = proto.iter().map(|&p| wo / p).collect();
            let denom = proto
                .iter()
                .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * -p);
            (vec![origin; n], poles, (1.0 / denom).re)
        }
        FilterKind::Bandpass { low_hz, high_hz } => {
            let (wl, wh) = (warp(low_hz), warp(high_hz));
            let bw = wh - wl;
            let wo2 = wl * wh;
            let mut poles = Vec::with_capacity(2 * n);
            for &p in &proto {
                let scaled = p * (bw / 2.0);
                let root = (scaled * scaled - wo2).sqrt();
                poles.push(scaled + root);
                poles.push(scaled - root);
            }
            (vec![origin; n], poles, bw.powi(n as i32))
        }
    };
    // Bilinear transform; zeros at infinity land on z = -1.
    let fs2 = 4.0;
    let num = zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &z| acc * (Complex64::new(fs2, 0.0) - z));
    let den = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (Complex64::new(fs2, 0.0) - p));
    let gain = gain * (num / den).re;
    let bilinear = |s: Complex64| (s + fs2) / (Complex64::new(fs2, 0.0) - s);
    let mut digital_zeros: Vec<f64> = zeros.iter().map(|&z| bilinear(z).re).collect();
    digital_zeros.resize(poles.len(), -1.0);
    let digital_poles: Vec<Complex64> = poles.iter().map(|&p| bilinear(p)).collect();
    if let Some(p) = digital_poles.iter().find(|p| p.norm() >= 1.0) {
        return Err(DriverError::filter_design(
            spec.name.as_str(),
            format!("unstable pole at {p}"),
        ));
    }
    build_sections(spec, &digital_zeros, &digital_poles, gain)
}
fn build_sections(
    spec: &FilterSpec,
    zeros: &[f64],
    poles: &[Complex64],
    gain: f64,
) -> Result<Vec<BiquadCoeffs>, DriverError> {
    let upper: Vec<Complex64> = poles.iter().copied().filter(|p| p.im > REAL_EPS).collect();
    let reals: Vec<f64> = poles
        .iter()
        .filter(|p| p.im.abs() <= REAL_EPS)
        .map(|p| p.re)
        .collect();
    if upper.len() * 2 + reals.len() != poles.len() {
        return Err(DriverError::filter_design(
            spec.name.as_str(),
            "poles do not form conjugate pairs",
        ));
    }
    // Interleave z = +1 and z = -1 so band-pass sections each get one of both.
    let (pos, neg): (Vec<f64>, Vec<f64>) = zeros.iter().partition(|z| **z > 0.0);
    let mut ordered: Vec<f64> = Vec::with_capacity(zeros.len());
    let (mut pi, mut ni) = (pos.iter(), neg.iter());
    loop {
        match (pi.next(), ni.next()) {
            (None, None) => break,
            (a, b) => ordered.extend(a.into_iter().chain(b)),
        }
    }
    let mut zero_iter = ordered.into_iter();
    let mut next_zero = move || zero_iter.next().unwrap_or(-1.0);
    let mut sections = Vec::with_capacity(poles.len() / 2 + 1);
    for p in &upper {
        let (z1, z2) = (next_zero(), next_zero());
        sections.push(second_order(z1, z2, -2.0 * p.re, p.norm_sqr()));
    }
    for pair in reals.chunks(2) {
        match pair {
            &[r1, r2] => {
                let (z1, z2) = (next_zero(), next_zero());
                sections.push(second_order(z1, z2, -(r1 + r2), r1 * r2));
            }
            &[r] => {
                let z = next_zero();
                sections.push(BiquadCoeffs {
                    b0: 1.0,
                    b1: -z,
                    b2: 0.0,
                    a1: -r,
                    a2: 0.0,
                });
            }
            _ => {}
        }
    }
    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }
    Ok(sections)
}
fn second_order(z1: f64, z2: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    BiquadCoeffs {
        b0: 1.0,
        b1: -(z1 + z2),
        b2: z1 * z2,
        a1,
        a2,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    const FS: f64 = 250.0;
    fn sine(freq_hz: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / FS).sin())
            .collect()
    }
    fn bank() -> Vec<FilterSpec> {
        vec![
            FilterSpec::highpass("visual highpass", 1.0, FS, 3),
            FilterSpec::lowpass("visual lowpass", 10.0, FS, 5),
            FilterSpec::bandpass("theta", 4.0, 8.0, FS, 5),
            FilterSpec::bandpass("alpha", 8.0, 12.0, FS, 5),
            FilterSpec::bandpass("beta", 13.0, 30.0, FS, 5),
            FilterSpec::bandpass("gamma", 30.0, 100.0, FS, 5),
        ]
    }
    #[test]
    fn every_filter_preserves_length() {
        let input: Vec<f64> = (0..500).map(|i| ((i * 7919) % 113) as f64 - 56.0).collect();
        for spec in bank() {
            let filter = spec.design().unwrap();
            assert_eq!(filter.apply(&input).len(), 500, "{}", spec.name);
            assert_eq!(filter.lfilter(&input).len(), 500);
            assert_eq!(filter.filtfilt(&input).len(), 500);
        }
    }
    #[test]
    fn short_inputs_keep_their_length() {
        let filter = FilterSpec::bandpass("theta", 4.0, 8.0, FS, 5).design().unwrap();
        assert!(filter.filtfilt(&[]).is_empty());
        assert_eq!(filter.filtfilt(&[1.0]).len(), 1);
        assert_eq!(filter.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }
    #[test]
    fn lowpass_has_unit_dc_gain_and_half_power_at_cutoff() {
        let filter = FilterSpec::lowpass("lp", 10.0, FS, 5).design().unwrap();
        assert_eq!(filter.section_count(), 3);
        assert!((filter.gain_at(0.0) - 1.0).abs() < 1e-9);
        assert!((filter.gain_at(10.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(filter.gain_at(40.0) < 1e-3);
    }
    #[test]
    fn highpass_passes_nyquist_and_blocks_dc() {
        let filter = FilterSpec::highpass("hp", 1.0, FS, 3).design().unwrap();
        assert!((filter.gain_at(FS / 2.0) - 1.0).abs() < 1e-9);
        assert!((filter.gain_at(1.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(filter.gain_at(0.0) < 1e-9);
    }
    #[test]
    fn bandpass_edges_are_half_power() {
        for (low, high) in [(4.0, 8.0), (8.0, 12.0), (13.0, 30.0), (30.0, 100.0)] {
            let filter = FilterSpec::bandpass("band", low, high, FS, 5).design().unwrap();
            assert_eq!(filter.section_count(), 5);
            for edge in [low, high] {
                let gain = filter.gain_at(edge);
                assert!(
                    (gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6,
                    "{low}-{high} Hz edge {edge}: {gain}"
                );
            }
            assert!(filter.gain_at(0.0) < 1e-9);
            assert!(filter.gain_at(FS / 2.0) < 1e-9);
        }
    }
    #[test]
    fn impulse_response_decays() {
        let mut impulse = vec![0.0; 2000];
        impulse[0] = 1.0;
        for spec in bank() {
            let filter = spec.design().unwrap();
            let response = filter.lfilter(&impulse);
            let tail = response[1900..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
            assert!(tail < 1e-6, "{} tail {tail}", spec.name);
        }
    }
    #[test]
    fn zero_phase_passband_sine_is_not_shifted() {
        let input = sine(10.0, 500);
        let filter = FilterSpec::bandpass("alpha", 8.0, 12.0, FS, 5).design().unwrap();
        let output = filter.filtfilt(&input);
        for i in 225..275 {
            assert!((output[i] - input[i]).abs() < 0.05, "sample {i}");
        }
    }
    #[test]
    fn zero_phase_highpass_removes_constant_offset() {
        let filter = FilterSpec::highpass("hp", 1.0, FS, 3).design().unwrap();
        let output = filter.filtfilt(&vec![50.0; 500]);
        assert!(output.iter().all(|v| v.abs() < 1e-6));
    }
    #[test]
    fn invalid_cutoffs_fail_at_design_time() {
        let bad = [
            FilterSpec::lowpass("lp", 125.0, FS, 5),
            FilterSpec::lowpass("lp", 0.0, FS, 5),
            FilterSpec::highpass("hp", -1.0, FS, 3),
            FilterSpec::highpass("hp", f64::NAN, FS, 3),
            FilterSpec::bandpass("gamma", 30.0, 130.0, FS, 5),
            FilterSpec::bandpass("inverted", 12.0, 8.0, FS, 5),
            FilterSpec::bandpass("zero order", 8.0, 12.0, FS, 0),
            FilterSpec::lowpass("no rate", 10.0, 0.0, 5),
        ];
        for spec in bad {
            match spec.design() {
                Err(DriverError::FilterDesign { filter, .. }) => assert_eq!(filter, spec.name),
                other => panic!("{} accepted: {other:?}", spec.name),
            }
        }
    }
}
