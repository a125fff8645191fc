use rustfft::{num_complex::Complex64, FftPlanner};
/// Magnitude spectrum of one channel.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub sample_rate_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub label: String,
}
impl FrequencySpectrum {
    /// Frequency of the strongest non-DC bin.
    pub fn peak_hz(&self) -> Option<f64> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| self.frequencies_hz[k])
    }
}
/// Helper that computes FFTs for a given window size.
pub struct SpectrumBuilder {
    fft_size: usize,
}
impl SpectrumBuilder {
    pub fn with_size(fft_size: usize) -> Self {
        Self {
            fft_size: fft_size.max(2),
        }
    }
    pub fn compute(&self, samples: &[f64], sample_rate_hz: f64, label: &str) -> FrequencySpectrum {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(self.fft_size);
        let bins = self.fft_size / 2;
        let frequencies = (0..bins)
            .map(|k| k as f64 * (sample_rate_hz / self.fft_size as f64))
            .collect();
        let mut buffer: Vec<Complex64> = samples
            .iter()
            .take(self.fft_size)
            .map(|v| Complex64::new(*v, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex64::new(0.0, 0.0));
        fft.process(&mut buffer);
        let magnitudes = buffer
            .iter()
            .take(bins)
            .map(|c| c.norm() / self.fft_size as f64)
            .collect();
        FrequencySpectrum {
            sample_rate_hz,
            frequencies_hz: frequencies,
            magnitudes,
            label: label.to_owned(),
        }
    }
}
