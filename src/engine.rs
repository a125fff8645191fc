// src/engine.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::Config;
use crate::drivers::{decode_tick, AcquisitionBoard, BandPipeline, DriverError, SignalBuffer};
use crate::telemetry::Dispatcher;
use crate::types::CycleReport;

// 采集循环的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Armed,
    Read,
    Accumulate,
    Cycle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    ReadyHigh,
    ReadyLow,
    PairValid,
    PairInvalid,
    BatchPending,
    BatchFull,
    CycleDone,
}

/// Pure transition table of the acquisition loop. Unlisted pairs keep the state.
pub fn transition(state: DriverState, event: Event) -> DriverState {
    use DriverState::*;
    match (state, event) {
        // Accumulate and Cycle wait for the next frame exactly like Idle.
        (Idle | Accumulate | Cycle, Event::ReadyHigh) => Armed,
        (Accumulate | Cycle, Event::ReadyLow) => Idle,
        (Armed, Event::ReadyLow) => Read,
        (Read, Event::PairValid) => Accumulate,
        (Read, Event::PairInvalid) => Idle,
        (Accumulate, Event::BatchFull) => Cycle,
        (Cycle, Event::CycleDone) => Accumulate,
        (s, _) => s,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Timing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_timeout: Duration::from_millis(config.acquisition.ready_timeout_ms),
            poll_interval: Duration::from_micros(config.acquisition.poll_interval_us),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub skipped: u64,
    pub cycles: u64,
    pub dropped: u64,
    pub sink_failures: u64,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// The frame set failed validation; nothing was appended.
    Skipped(DriverError),
    Accumulated { batch_len: usize },
    Cycle(Box<CycleReport>),
}

/// Owns the board, the window buffer, the filter pipeline and the dispatcher
/// for one acquisition run.
pub struct Session<B: AcquisitionBoard> {
    board: B,
    buffer: SignalBuffer,
    pipeline: BandPipeline,
    dispatcher: Option<Dispatcher>,
    timing: Timing,
    state: DriverState,
    summary: RunSummary,
}

impl<B: AcquisitionBoard> Session<B> {
    pub fn new(
        board: B,
        config: &Config,
        dispatcher: Option<Dispatcher>,
    ) -> Result<Self, DriverError> {
        let acq = &config.acquisition;
        if board.device_count() != acq.devices {
            return Err(DriverError::Config(format!(
                "board {} has {} device(s), configuration expects {}",
                board.name(),
                board.device_count(),
                acq.devices
            )));
        }
        let buffer = SignalBuffer::new(acq.channel_labels(), acq.sample_rate_hz, acq.window)?;
        let pipeline = BandPipeline::new(&config.filters, config.power.clone(), acq.sample_rate_hz)?;
        Ok(Self {
            board,
            buffer,
            pipeline,
            dispatcher,
            timing: Timing::from_config(config),
            state: DriverState::Idle,
            summary: RunSummary::default(),
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn buffer(&self) -> &SignalBuffer {
        &self.buffer
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            dropped: self.dispatcher.as_ref().map(|d| d.dropped()).unwrap_or(0),
            ..self.summary
        }
    }

    fn step(&mut self, event: Event) {
        self.state = transition(self.state, event);
    }

    /// Polls the data-ready line until it rises and falls again, or times out.
    pub fn wait_for_frame(&mut self) -> Result<(), DriverError> {
        let started = Instant::now();
        loop {
            let event = if self.board.data_ready()? {
                Event::ReadyHigh
            } else {
                Event::ReadyLow
            };
            self.step(event);
            if self.state == DriverState::Read {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.timing.ready_timeout {
                return Err(DriverError::NotReady {
                    resource: format!("{} data-ready line", self.board.name()),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            if !self.timing.poll_interval.is_zero() {
                thread::sleep(self.timing.poll_interval);
            }
        }
    }

    /// Waits for one frame set, appends it and runs a cycle if the batch is full.
    pub fn tick(&mut self) -> Result<TickOutcome, DriverError> {
        self.wait_for_frame()?;
        let frames = self.board.read_frames()?;
        let row = match decode_tick(&frames, self.board.device_count()) {
            Ok(row) => row,
            Err(e) => {
                self.step(Event::PairInvalid);
                self.summary.skipped += 1;
                warn!("skipping tick: {e}");
                return Ok(TickOutcome::Skipped(e));
            }
        };
        self.step(Event::PairValid);
        self.buffer.push_tick(&row)?;
        self.summary.ticks += 1;
        if !self.buffer.is_full() {
            self.step(Event::BatchPending);
            return Ok(TickOutcome::Accumulated {
                batch_len: self.buffer.batch_len(),
            });
        }
        self.step(Event::BatchFull);
        let Some(frame) = self.buffer.take_windows() else {
            self.step(Event::CycleDone);
            return Ok(TickOutcome::Accumulated { batch_len: 0 });
        };
        let report = self.pipeline.process(&frame);
        self.step(Event::CycleDone);
        let report = report?;
        self.summary.cycles += 1;
        debug!("cycle {} powers {:?}", report.cycle, report.band_power);
        info!(
            "cycle {}: dominant {} level {}",
            report.cycle,
            report.dominant,
            report.udp_payload()
        );
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            if let Err(e) = dispatcher.submit(report.clone()) {
                warn!("dispatch failed: {e}");
            }
        }
        Ok(TickOutcome::Cycle(Box::new(report)))
    }

    /// Runs until `stop` is set, `max_cycles` is reached or a fatal error occurs.
    pub fn run(
        &mut self,
        stop: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<RunSummary, DriverError> {
        info!(
            "acquiring from {} board: {} channels, window {}",
            self.board.name(),
            self.buffer.channel_labels().len(),
            self.buffer.window()
        );
        while !stop.load(Ordering::Relaxed) {
            if max_cycles.is_some_and(|max| self.summary.cycles >= max) {
                break;
            }
            match self.tick() {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("cycle failed: {e}"),
            }
        }
        Ok(self.summary())
    }

    /// Stops the dispatcher and returns the final totals.
    pub fn finish(mut self) -> RunSummary {
        let mut summary = self.summary;
        if let Some(dispatcher) = self.dispatcher.take() {
            let stats = dispatcher.finish();
            summary.dropped = stats.dropped;
            summary.sink_failures = stats.sink_failures;
        }
        summary
    }
}
