use crate::drivers::DriverError;
/// Per-channel 2W datasets handed to the filter bank when a batch completes.
#[derive(Clone, Debug)]
pub struct WindowFrame {
    pub sample_rate_hz: f64,
    pub window: usize,
    pub channel_labels: Vec<String>,
    pub samples: Vec<Vec<f64>>, // channels x 2W
}
impl WindowFrame {
    /// Most recent sample of every channel.
    pub fn last_row(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|c| c.last().copied().unwrap_or(0.0))
            .collect()
    }
}
/// Rolling history of one channel: the previous window plus the batch being
/// accumulated.
#[derive(Clone, Debug)]
pub struct ChannelHistory {
    previous: Vec<f64>,
    current: Vec<f64>,
    window: usize,
}
impl ChannelHistory {
    /// Cold start: `previous` is seeded with W zeros.
    pub fn new(window: usize) -> Self {
        Self {
            previous: vec![0.0; window],
            current: Vec::with_capacity(window),
            window,
        }
    }
    pub fn push(&mut self, sample: f64) {
        self.current.push(sample);
    }
    pub fn previous(&self) -> &[f64] {
        &self.previous
    }
    pub fn batch_len(&self) -> usize {
        self.current.len()
    }
    /// Rolls the window once `current` holds W samples and returns
    /// `previous ++ current`.
    pub fn on_full_batch(&mut self) -> Option<Vec<f64>> {
        if self.current.len() != self.window {
            return None;
        }
        let mut dataset = Vec::with_capacity(self.window * 2);
        dataset.extend_from_slice(&self.previous);
        dataset.append(&mut self.current);
        self.previous.clear();
        self.previous.extend_from_slice(&dataset[self.window..]);
        Some(dataset)
    }
}
/// Sliding window buffer for every acquired channel.
pub struct SignalBuffer {
    per_channel: Vec<ChannelHistory>,
    channel_labels: Vec<String>,
    sample_rate_hz: f64,
    window: usize,
}
impl SignalBuffer {
    pub fn new(
        channel_labels: Vec<String>,
        sample_rate_hz: f64,
        window: usize,
    ) -> Result<Self, DriverError> {
        if sample_rate_hz <= 0.0 || !sample_rate_hz.is_finite() {
            return Err(DriverError::InvalidSampleRate);
        }
        if window == 0 {
            return Err(DriverError::InvalidWindow);
        }
        let per_channel = channel_labels
            .iter()
            .map(|_| ChannelHistory::new(window))
            .collect();
        Ok(Self {
            per_channel,
            channel_labels,
            sample_rate_hz,
            window,
        })
    }
    pub fn window(&self) -> usize {
        self.window
    }
    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }
    pub fn channel(&self, index: usize) -> Option<&ChannelHistory> {
        self.per_channel.get(index)
    }
    pub fn batch_len(&self) -> usize {
        self.per_channel.first().map(|c| c.batch_len()).unwrap_or(0)
    }
    pub fn is_full(&self) -> bool {
        self.batch_len() >= self.window
    }
    /// Appends one tick. The row is rejected whole if its width is wrong.
    pub fn push_tick(&mut self, row: &[f64]) -> Result<(), DriverError> {
        if row.len() != self.per_channel.len() {
            return Err(DriverError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: row.len(),
            });
        }
        for (history, &sample) in self.per_channel.iter_mut().zip(row) {
            history.push(sample);
        }
        Ok(())
    }
    /// Rolls every channel and returns the 2W datasets, or `None` while the
    /// batch is still filling.
    pub fn take_windows(&mut self) -> Option<WindowFrame> {
        if !self.is_full() {
            return None;
        }
        let samples: Option<Vec<Vec<f64>>> = self
            .per_channel
            .iter_mut()
            .map(|history| history.on_full_batch())
            .collect();
        Some(WindowFrame {
            sample_rate_hz: self.sample_rate_hz,
            window: self.window,
            channel_labels: self.channel_labels.clone(),
            samples: samples?,
        })
    }
}
