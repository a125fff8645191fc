//! ADS1299 command set and the bring-up sequence used for every device in the chain.
use crate::drivers::DriverError;
pub const CONFIG1: u8 = 0x01;
pub const CONFIG2: u8 = 0x02;
pub const CONFIG3: u8 = 0x03;
pub const CH1SET: u8 = 0x05;
pub const GPIO: u8 = 0x14;
const WREG: u8 = 0x40;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Wakeup,
    Stop,
    Reset,
    /// Leave read-data-continuous mode so registers can be written.
    Sdatac,
    /// Enter read-data-continuous mode.
    Rdatac,
    Start,
    WriteRegister { register: u8, value: u8 },
}
impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Wakeup => 0x02,
            Command::Stop => 0x0A,
            Command::Reset => 0x06,
            Command::Sdatac => 0x11,
            Command::Rdatac => 0x10,
            Command::Start => 0x08,
            Command::WriteRegister { register, .. } => WREG | register,
        }
    }
    /// Bytes clocked out on the bus for this command.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::WriteRegister { value, .. } => vec![self.opcode(), 0x00, *value],
            _ => vec![self.opcode()],
        }
    }
}
fn write(register: u8, value: u8) -> Command {
    Command::WriteRegister { register, value }
}
/// Wake, reset and configure one device, then start continuous conversion.
pub fn init_sequence() -> Vec<Command> {
    let mut seq = vec![
        Command::Wakeup,
        Command::Stop,
        Command::Reset,
        Command::Sdatac,
        write(GPIO, 0x80),
        write(CONFIG1, 0x96),
        write(CONFIG2, 0xD4),
        write(CONFIG3, 0xFF),
        write(0x04, 0x00),
    ];
    seq.extend((0x0D..=0x11).map(|reg| write(reg, 0x00)));
    seq.push(write(0x15, 0x20));
    seq.push(write(0x17, 0x00));
    seq.extend((0..8).map(|ch| write(CH1SET + ch, 0x00)));
    seq.push(Command::Rdatac);
    seq.push(Command::Start);
    seq
}
/// Something that can send command bytes to one device of the chain.
pub trait RegisterBus {
    fn transfer(&mut self, device: usize, bytes: &[u8]) -> Result<(), DriverError>;
}
/// Runs the bring-up sequence on every device, first to last.
pub fn initialize<B: RegisterBus + ?Sized>(bus: &mut B, devices: usize) -> Result<(), DriverError> {
    let sequence = init_sequence();
    for device in 0..devices {
        for command in &sequence {
            bus.transfer(device, &command.encode())?;
        }
        log::debug!("device {device} configured ({} commands)", sequence.len());
    }
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    #[derive(Default)]
    struct RecordingBus {
        sent: Vec<(usize, Vec<u8>)>,
        fail_on: Option<usize>,
    }
    impl RegisterBus for RecordingBus {
        fn transfer(&mut self, device: usize, bytes: &[u8]) -> Result<(), DriverError> {
            if self.fail_on == Some(self.sent.len()) {
                return Err(DriverError::device_io("/dev/spidev0.1", "EBUSY"));
            }
            self.sent.push((device, bytes.to_vec()));
            Ok(())
        }
    }
    #[test]
    fn write_register_frame_layout() {
        assert_eq!(write(CONFIG1, 0x96).encode(), vec![0x41, 0x00, 0x96]);
        assert_eq!(Command::Sdatac.encode(), vec![0x11]);
        assert_eq!(write(CH1SET + 7, 0x00).opcode(), 0x4C);
    }
    #[test]
    fn sequence_brackets_register_writes() {
        let seq = init_sequence();
        assert_eq!(
            &seq[..4],
            &[Command::Wakeup, Command::Stop, Command::Reset, Command::Sdatac]
        );
        assert_eq!(&seq[seq.len() - 2..], &[Command::Rdatac, Command::Start]);
        let writes = seq
            .iter()
            .filter(|c| matches!(c, Command::WriteRegister { .. }))
            .count();
        assert_eq!(writes, 5 + 5 + 2 + 8);
    }
    #[test]
    fn every_device_gets_the_full_sequence() {
        let mut bus = RecordingBus::default();
        initialize(&mut bus, 2).unwrap();
        let per_device = init_sequence().len();
        assert_eq!(bus.sent.len(), per_device * 2);
        assert!(bus.sent[..per_device].iter().all(|(d, _)| *d == 0));
        assert!(bus.sent[per_device..].iter().all(|(d, _)| *d == 1));
    }
    #[test]
    fn bus_failure_stops_initialization() {
        let mut bus = RecordingBus {
            fail_on: Some(3),
            ..RecordingBus::default()
        };
        let err = initialize(&mut bus, 2).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bus.sent.len(), 3);
    }
}
