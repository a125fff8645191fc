use std::io::{Read, Write};
use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use crate::config::AcquisitionSettings;
use crate::drivers::ads1299::{self, Command, RegisterBus};
use crate::drivers::frame::{RawFrame, FRAME_LEN};
use crate::drivers::{AcquisitionBoard, DriverError};
const CONSUMER: &str = "pieeg-bands";
struct SpiDevice {
    path: String,
    bus: Spidev,
}
impl SpiDevice {
    fn open(path: &str, speed_hz: u32) -> Result<Self, DriverError> {
        let mut bus = Spidev::open(path).map_err(|e| DriverError::device_io(path, e))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(speed_hz)
            .lsb_first(false)
            .mode(SpiModeFlags::SPI_MODE_1)
            .build();
        bus.configure(&options)
            .map_err(|e| DriverError::device_io(path, e))?;
        Ok(Self {
            path: path.to_string(),
            bus,
        })
    }
}
/// PiEEG shield on a Raspberry Pi: one spidev node per ADS1299 plus the
/// shared data-ready line and the manual chip-select for the second device.
pub struct PiEegBoard {
    devices: Vec<SpiDevice>,
    chip_select: Option<LineHandle>,
    data_ready: LineHandle,
    gpio_chip: String,
    released: bool,
}
impl PiEegBoard {
    /// Opens the buses and lines, then runs the bring-up sequence on every device.
    pub fn connect(settings: &AcquisitionSettings) -> Result<Self, DriverError> {
        let chip_path = settings.gpio_chip.as_str();
        let mut chip = Chip::new(chip_path).map_err(|e| DriverError::device_io(chip_path, e))?;
        let data_ready = chip
            .get_line(settings.data_ready_line)
            .and_then(|line| line.request(LineRequestFlags::INPUT, 0, CONSUMER))
            .map_err(|e| {
                DriverError::device_io(
                    format!("{chip_path} line {}", settings.data_ready_line),
                    e,
                )
            })?;
        let chip_select = if settings.devices > 1 {
            let handle = chip
                .get_line(settings.chip_select_line)
                .and_then(|line| line.request(LineRequestFlags::OUTPUT, 1, CONSUMER))
                .map_err(|e| {
                    DriverError::device_io(
                        format!("{chip_path} line {}", settings.chip_select_line),
                        e,
                    )
                })?;
            Some(handle)
        } else {
            None
        };
        let devices = settings
            .spi_paths
            .iter()
            .take(settings.devices)
            .map(|path| SpiDevice::open(path, settings.spi_speed_hz))
            .collect::<Result<Vec<_>, _>>()?;
        if devices.len() != settings.devices {
            return Err(DriverError::Config(format!(
                "{} devices requested but only {} SPI paths configured",
                settings.devices,
                devices.len()
            )));
        }
        let mut board = Self {
            devices,
            chip_select,
            data_ready,
            gpio_chip: chip_path.to_string(),
            released: false,
        };
        ads1299::initialize(&mut board, settings.devices)?;
        log::info!(
            "PiEEG ready: {} device(s), data-ready on {} line {}",
            board.devices.len(),
            chip_path,
            settings.data_ready_line
        );
        Ok(board)
    }
    fn set_chip_select(&self, device: usize, level: u8) -> Result<(), DriverError> {
        // Only the second device needs manual chip-select.
        match (&self.chip_select, device) {
            (Some(cs), 1) => cs
                .set_value(level)
                .map_err(|e| DriverError::device_io(format!("{} chip-select", self.gpio_chip), e)),
            _ => Ok(()),
        }
    }
    fn with_device<T>(
        &mut self,
        device: usize,
        op: impl FnOnce(&mut SpiDevice) -> std::io::Result<T>,
    ) -> Result<T, DriverError> {
        self.set_chip_select(device, 0)?;
        let spi = self
            .devices
            .get_mut(device)
            .ok_or_else(|| DriverError::device_io(format!("device {device}"), "not configured"))?;
        let result = op(spi).map_err(|e| DriverError::device_io(spi.path.clone(), e));
        self.set_chip_select(device, 1)?;
        result
    }
    /// Stops conversion on every device. Safe to call more than once.
    pub fn release(&mut self) -> Result<(), DriverError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        for device in 0..self.devices.len() {
            self.transfer(device, &Command::Stop.encode())?;
        }
        log::info!("PiEEG released");
        Ok(())
    }
}
impl RegisterBus for PiEegBoard {
    fn transfer(&mut self, device: usize, bytes: &[u8]) -> Result<(), DriverError> {
        self.with_device(device, |spi| spi.bus.write_all(bytes))
    }
}
impl AcquisitionBoard for PiEegBoard {
    fn name(&self) -> &str {
        "pieeg"
    }
    fn device_count(&self) -> usize {
        self.devices.len()
    }
    fn data_ready(&mut self) -> Result<bool, DriverError> {
        self.data_ready
            .get_value()
            .map(|level| level != 0)
            .map_err(|e| DriverError::device_io(format!("{} data-ready", self.gpio_chip), e))
    }
    fn read_frames(&mut self) -> Result<Vec<RawFrame>, DriverError> {
        let mut frames = Vec::with_capacity(self.devices.len());
        for device in 0..self.devices.len() {
            let bytes = self.with_device(device, |spi| {
                let mut buf = vec![0u8; FRAME_LEN];
                let n = spi.bus.read(&mut buf)?;
                buf.truncate(n);
                Ok(buf)
            })?;
            frames.push(RawFrame::new(bytes));
        }
        Ok(frames)
    }
}
impl Drop for PiEegBoard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("failed to stop PiEEG cleanly: {e}");
        }
    }
}
