use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::drivers::DriverError;
use crate::telemetry::TelemetrySink;
use crate::types::CycleReport;

const HEADER: &str = "timestamp,cycle,theta,alpha,beta,gamma,dominant_wave";

/// Appends one CSV row of band powers per cycle.
pub struct PowerRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    rows: u64,
}

impl PowerRecorder {
    pub fn create(path: &Path) -> Result<Self, DriverError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DriverError::dispatch(path.display().to_string(), e))?;
        let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        let mut writer = BufWriter::new(file);
        // 新文件才写表头
        if is_empty {
            writeln!(writer, "{HEADER}")
                .map_err(|e| DriverError::dispatch(path.display().to_string(), e))?;
        }
        log::info!("recording band powers to {}", path.display());
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write_record(&mut self, report: &CycleReport) -> std::io::Result<()> {
        let p = &report.band_power;
        writeln!(
            self.writer,
            "{:.3},{},{:.6},{:.6},{:.6},{:.6},{}",
            report.timestamp, report.cycle, p.theta, p.alpha, p.beta, p.gamma, report.dominant
        )?;
        // 每个周期都落盘，进程被杀也不丢数据
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl TelemetrySink for PowerRecorder {
    fn name(&self) -> &str {
        "history"
    }

    fn publish(&mut self, report: &CycleReport) -> Result<(), DriverError> {
        self.write_record(report)
            .map_err(|e| DriverError::dispatch(self.path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::BandPower;
    use crate::types::report_with;

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("powers.csv");
        let report = report_with(BandPower::new(0.001, 0.004, 0.002, 0.0005));
        {
            let mut recorder = PowerRecorder::create(&path).unwrap();
            recorder.publish(&report).unwrap();
            assert_eq!(recorder.rows(), 1);
        }
        {
            let mut recorder = PowerRecorder::create(&path).unwrap();
            recorder.publish(&report).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].ends_with(",alpha"));
        assert!(lines[1].contains(",0.004000,"));
    }
}
