//! Per-cycle outputs and the background dispatcher that feeds them.
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};

use crate::drivers::{render_spectrum_png, render_waveform_png, DriverError, PlotStyle, SpectrumBuilder};
use crate::types::CycleReport;

/// A consumer of cycle reports. Failures are reported, never fatal.
pub trait TelemetrySink: Send {
    fn name(&self) -> &str;
    fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError>;
}

/// Sends the capped total band power as one ASCII datagram per cycle.
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    pub fn connect(target: &str) -> Result<Self, DriverError> {
        let target = target
            .to_socket_addrs()
            .map_err(|e| DriverError::dispatch(target, e))?
            .next()
            .ok_or_else(|| DriverError::dispatch(target, "address did not resolve"))?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).map_err(|e| DriverError::dispatch("udp", e))?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl TelemetrySink for UdpSink {
    fn name(&self) -> &str {
        "udp"
    }

    fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError> {
        let payload = report.udp_payload();
        self.socket
            .send_to(payload.as_bytes(), self.target)
            .map_err(|e| DriverError::dispatch(self.target.to_string(), e))?;
        debug!("udp {} <- {payload}", self.target);
        Ok(())
    }
}

/// Overwrites a JSON snapshot of the latest cycle.
pub struct SnapshotSink {
    path: PathBuf,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TelemetrySink for SnapshotSink {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError> {
        let fail = |e: &dyn std::fmt::Display| DriverError::dispatch(self.path.display().to_string(), e.to_string());
        let bytes = serde_json::to_vec(&report.snapshot()).map_err(|e| fail(&e))?;
        // Readers never observe a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| fail(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| fail(&e))
    }
}

/// Renders the smoothed traces and the band-input spectrum to PNG files.
pub struct PlotSink {
    dir: PathBuf,
    style: PlotStyle,
}

impl PlotSink {
    pub fn create(dir: &Path) -> Result<Self, DriverError> {
        fs::create_dir_all(dir).map_err(|e| DriverError::dispatch(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            style: PlotStyle::default(),
        })
    }

    fn write(&self, name: &str, png: &[u8]) -> Result<(), DriverError> {
        let path = self.dir.join(name);
        fs::write(&path, png).map_err(|e| DriverError::dispatch(path.display().to_string(), e))
    }
}

impl TelemetrySink for PlotSink {
    fn name(&self) -> &str {
        "plot"
    }

    fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError> {
        let wave = render_waveform_png(&report.smoothed, &report.channel_labels, &self.style)?;
        self.write("waveform.png", &wave)?;
        let spectrum = SpectrumBuilder::with_size(report.representative.len()).compute(
            &report.representative,
            report.sample_rate_hz,
            "band input",
        );
        let fft = render_spectrum_png(&spectrum, &self.style)?;
        self.write("spectrum.png", &fft)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub published: u64,
    pub sink_failures: u64,
    pub dropped: u64,
}

/// Fire-and-forget fan-out to the sinks on a dedicated thread.
///
/// The channel holds one report; a newer report replaces one that the worker
/// has not picked up yet, so acquisition never waits on slow sinks.
pub struct Dispatcher {
    tx: Option<Sender<CycleReport>>,
    stale: Receiver<CycleReport>,
    worker: Option<JoinHandle<DispatchStats>>,
    dropped: u64,
}

impl Dispatcher {
    pub fn spawn(mut sinks: Vec<Box<dyn TelemetrySink>>) -> Result<Self, DriverError> {
        let (tx, rx) = bounded::<CycleReport>(1);
        let stale = rx.clone();
        let worker = thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                let mut stats = DispatchStats::default();
                for report in rx.iter() {
                    for sink in sinks.iter_mut() {
                        // A panicking sink counts as a failure; the others keep running.
                        match panic::catch_unwind(AssertUnwindSafe(|| sink.publish(&report))) {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                stats.sink_failures += 1;
                                warn!("{} sink failed on cycle {}: {e}", sink.name(), report.cycle);
                            }
                            Err(_) => {
                                stats.sink_failures += 1;
                                warn!("{} sink panicked on cycle {}", sink.name(), report.cycle);
                            }
                        }
                    }
                    stats.published += 1;
                }
                stats
            })
            .map_err(|e| DriverError::dispatch("telemetry thread", e))?;
        Ok(Self {
            tx: Some(tx),
            stale,
            worker: Some(worker),
            dropped: 0,
        })
    }

    pub fn submit(&mut self, report: CycleReport) -> Result<(), DriverError> {
        let (Some(tx), Some(worker)) = (&self.tx, &self.worker) else {
            return Err(DriverError::dispatch("telemetry", "dispatcher already stopped"));
        };
        if worker.is_finished() {
            return Err(DriverError::dispatch("telemetry", "worker exited"));
        }
        // `stale` keeps the channel connected, so a full slot is the only refusal.
        if let Err(TrySendError::Full(report)) = tx.try_send(report) {
            if let Ok(old) = self.stale.try_recv() {
                self.dropped += 1;
                debug!("dropped stale report for cycle {}", old.cycle);
            }
            if let Err(TrySendError::Full(report)) = tx.try_send(report) {
                self.dropped += 1;
                debug!("dropped report for cycle {}", report.cycle);
            }
        }
        Ok(())
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Closes the channel, waits for queued work and returns the totals.
    pub fn finish(mut self) -> DispatchStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> DispatchStats {
        self.tx.take();
        let mut stats = match self.worker.take().map(|w| w.join()) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("telemetry thread panicked");
                DispatchStats::default()
            }
            None => DispatchStats::default(),
        };
        stats.dropped = self.dropped;
        stats
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::BandPower;
    use crate::types::{report_with, Snapshot};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct GatedSink {
        seen: Sender<u64>,
        gate: Receiver<()>,
    }

    impl TelemetrySink for GatedSink {
        fn name(&self) -> &str {
            "gated"
        }

        fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError> {
            self.seen.send(report.cycle).ok();
            self.gate.recv().ok();
            Ok(())
        }
    }

    struct PanickingSink;

    impl TelemetrySink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        fn publish(&mut self, _report: &CycleReport) -> Result<(), DriverError> {
            panic!("renderer blew up")
        }
    }

    struct FailingSink;

    impl TelemetrySink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn publish(&mut self, _report: &CycleReport) -> Result<(), DriverError> {
            Err(DriverError::dispatch("nowhere", "refused"))
        }
    }

    fn report(cycle: u64) -> CycleReport {
        let mut report = report_with(BandPower::new(0.0005, 0.0005, 0.0005, 0.0005));
        report.cycle = cycle;
        report
    }

    #[test]
    fn udp_sink_sends_payload() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let target = receiver.local_addr().unwrap().to_string();
        let mut sink = UdpSink::connect(&target).unwrap();
        sink.publish(&report(1)).unwrap();
        let mut buf = [0u8; 32];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"2.00");
    }

    #[test]
    fn snapshot_sink_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_eeg_data.json");
        let mut sink = SnapshotSink::new(&path);
        sink.publish(&report_with(BandPower::new(0.001, 0.004, 0.002, 0.0005)))
            .unwrap();
        sink.publish(&report_with(BandPower::new(0.009, 0.004, 0.002, 0.0005)))
            .unwrap();
        let snap: Snapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snap.dominant_wave, "theta");
        assert_eq!(snap.command, "theta");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn snapshot_failure_is_a_dispatch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(dir.path().join("missing").join("snap.json"));
        let err = sink.publish(&report(1)).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn plot_sink_writes_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PlotSink::create(&dir.path().join("plots")).unwrap();
        sink.publish(&report(1)).unwrap();
        assert!(dir.path().join("plots/waveform.png").exists());
        assert!(dir.path().join("plots/spectrum.png").exists());
    }

    #[test]
    fn stale_reports_are_replaced() {
        let (seen_tx, seen_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded();
        let sink = GatedSink {
            seen: seen_tx,
            gate: gate_rx,
        };
        let mut dispatcher = Dispatcher::spawn(vec![Box::new(sink)]).unwrap();
        dispatcher.submit(report(1)).unwrap();
        // Worker is now blocked inside the sink.
        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        for cycle in 2..=4 {
            dispatcher.submit(report(cycle)).unwrap();
        }
        assert_eq!(dispatcher.dropped(), 2);
        for _ in 0..2 {
            gate_tx.send(()).unwrap();
        }
        let stats = dispatcher.finish();
        let delivered: Vec<u64> = seen_rx.try_iter().collect();
        assert_eq!(delivered, vec![4]);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn sink_failures_do_not_stop_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let sinks: Vec<Box<dyn TelemetrySink>> =
            vec![Box::new(FailingSink), Box::new(SnapshotSink::new(&path))];
        let mut dispatcher = Dispatcher::spawn(sinks).unwrap();
        dispatcher.submit(report(1)).unwrap();
        let stats = dispatcher.finish();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.sink_failures, 1);
        assert!(path.exists());
    }

    #[test]
    fn panicking_sink_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let sinks: Vec<Box<dyn TelemetrySink>> =
            vec![Box::new(PanickingSink), Box::new(SnapshotSink::new(&path))];
        let mut dispatcher = Dispatcher::spawn(sinks).unwrap();
        dispatcher.submit(report(1)).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        dispatcher.submit(report(2)).unwrap();
        let stats = dispatcher.finish();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.sink_failures, 2);
        let snap: Snapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snap.command, "theta");
    }
}
