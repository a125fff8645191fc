//! Fixed-point frame decoding for the ADS1299 read-data-continuous stream.
//!
//! A frame is 27 bytes: a 3-byte status word followed by eight 24-bit,
//! MSB-first sample words. Samples are scaled to microvolts with a 4.5 V
//! reference and unity gain.
use crate::drivers::DriverError;
pub const FRAME_LEN: usize = 27;
pub const CHANNELS_PER_DEVICE: usize = 8;
/// Status word the gating device reports when its conversion is valid.
pub const STATUS_PREFIX: [u8; 3] = [0xC0, 0x00, 0x08];
pub const REFERENCE_VOLTS: f64 = 4.5;
pub const FULL_SCALE: f64 = 16_777_215.0;
const SIGN_PROBE: u32 = 0x7F_FFFF;
const SIGN_CHECK: u32 = 0xFF_FFFF;
const SIGN_FOLD: i32 = 16_777_214;
/// One raw read from one device at one sample tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}
impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    pub fn status(&self) -> Option<[u8; 3]> {
        self.bytes.get(..3).map(|s| [s[0], s[1], s[2]])
    }
    pub fn has_valid_status(&self) -> bool {
        self.status() == Some(STATUS_PREFIX)
    }
    /// Builds a well-formed frame from already-corrected sample codes.
    pub fn from_codes(codes: &[i32; CHANNELS_PER_DEVICE]) -> Self {
        let mut bytes = Vec::with_capacity(FRAME_LEN);
        bytes.extend_from_slice(&STATUS_PREFIX);
        for &code in codes {
            bytes.extend_from_slice(&encode_code(code));
        }
        Self { bytes }
    }
}
/// Applies the device's sign fold to a raw 24-bit word.
///
/// Words whose top bit is set are shifted down by `0xFFFFFE`, not `2^24`, so
/// `0xFFFFFF` decodes to `+1` and `0x800000` to `-8388606`.
pub fn fold_sign(raw: u32) -> i32 {
    let raw = raw & SIGN_CHECK;
    if raw | SIGN_PROBE == SIGN_CHECK {
        raw as i32 - SIGN_FOLD
    } else {
        raw as i32
    }
}
/// Inverse of [`fold_sign`] for the representable range
/// `-8388606..=8388607`; codes outside it are clamped.
pub fn encode_code(code: i32) -> [u8; 3] {
    let code = code.clamp(-(SIGN_PROBE as i32) + 1, SIGN_PROBE as i32);
    let raw = if code < 0 {
        (code + SIGN_FOLD) as u32
    } else {
        code as u32
    };
    [(raw >> 16) as u8, (raw >> 8) as u8, raw as u8]
}
pub fn code_to_microvolts(code: i32) -> f64 {
    round2(1_000_000.0 * REFERENCE_VOLTS * (code as f64 / FULL_SCALE))
}
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
/// Decodes the eight channels of one frame. Does not look at the status word.
pub fn decode_frame(frame: &RawFrame) -> Result<[f64; CHANNELS_PER_DEVICE], DriverError> {
    let bytes = frame.as_bytes();
    if bytes.len() < FRAME_LEN {
        return Err(DriverError::FrameTooShort {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }
    let mut out = [0.0; CHANNELS_PER_DEVICE];
    for (channel, word) in bytes[3..FRAME_LEN].chunks_exact(3).enumerate() {
        let raw = (word[0] as u32) << 16 | (word[1] as u32) << 8 | word[2] as u32;
        out[channel] = code_to_microvolts(fold_sign(raw));
    }
    Ok(out)
}
/// Decodes one matched set of frames (one per device) into a flat channel row.
///
/// The last frame gates the whole tick: if its status word is wrong nothing is
/// decoded. Any short frame also rejects the tick, so callers never see a
/// partial row.
pub fn decode_tick(frames: &[RawFrame], devices: usize) -> Result<Vec<f64>, DriverError> {
    if frames.len() != devices {
        return Err(DriverError::FrameCountMismatch {
            expected: devices,
            actual: frames.len(),
        });
    }
    if let Some(gate) = frames.last() {
        if gate.as_bytes().len() < FRAME_LEN {
            return Err(DriverError::FrameTooShort {
                expected: FRAME_LEN,
                actual: gate.as_bytes().len(),
            });
        }
        if !gate.has_valid_status() {
            return Err(DriverError::StatusMismatch {
                device: frames.len() - 1,
                found: gate.status().unwrap_or_default(),
            });
        }
    }
    let mut row = Vec::with_capacity(devices * CHANNELS_PER_DEVICE);
    for frame in frames {
        row.extend_from_slice(&decode_frame(frame)?);
    }
    Ok(row)
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn fold_subtracts_only_when_top_bit_pattern_matches() {
        assert_eq!(fold_sign(0xFF_FFFF), 1);
        assert_eq!(fold_sign(0xFF_FFFE), 0);
        assert_eq!(fold_sign(0x80_0000), 0x80_0000 - 16_777_214);
        assert_eq!(fold_sign(0x7F_FFFF), 0x7F_FFFF);
        assert_eq!(fold_sign(0x00_0001), 1);
        assert_eq!(fold_sign(0), 0);
    }
    #[test]
    fn decode_reproduces_encoded_codes() {
        let codes = [0, 1, -1, 1_000, -1_000, 8_388_607, -8_388_606, 123_456];
        let frame = RawFrame::from_codes(&codes);
        assert_eq!(frame.as_bytes().len(), FRAME_LEN);
        let decoded = decode_frame(&frame).unwrap();
        for (value, code) in decoded.iter().zip(codes) {
            let expected = 1_000_000.0 * 4.5 * code as f64 / 16_777_215.0;
            assert!(
                (value - expected).abs() <= 0.005 + 1e-9,
                "{value} vs {expected}"
            );
        }
    }
    #[test]
    fn known_words_scale_to_microvolts() {
        let mut bytes = STATUS_PREFIX.to_vec();
        bytes.extend_from_slice(&[0x00, 0x00, 0x01]);
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFD]);
        bytes.extend(std::iter::repeat(0).take(18));
        let decoded = decode_frame(&RawFrame::new(bytes)).unwrap();
        assert_eq!(decoded[0], 0.27);
        assert_eq!(decoded[1], -0.27);
        assert!(decoded[2..].iter().all(|v| *v == 0.0));
    }
    #[test]
    fn short_frame_is_rejected() {
        let err = decode_frame(&RawFrame::new(vec![0xC0, 0x00, 0x08, 0x01])).unwrap_err();
        assert!(matches!(
            err,
            DriverError::FrameTooShort {
                expected: 27,
                actual: 4
            }
        ));
    }
    #[test]
    fn gating_device_status_decides_the_tick() {
        let good = RawFrame::from_codes(&[10; 8]);
        let mut bad_bytes = good.as_bytes().to_vec();
        bad_bytes[0] = 0x00;
        let bad = RawFrame::new(bad_bytes);
        // A bad first device is still decoded when the gating device is fine.
        let row = decode_tick(&[bad.clone(), good.clone()], 2).unwrap();
        assert_eq!(row.len(), 16);
        let err = decode_tick(&[good, bad], 2).unwrap_err();
        assert!(matches!(err, DriverError::StatusMismatch { device: 1, .. }));
    }
    #[test]
    fn frame_count_must_match_device_count() {
        let good = RawFrame::from_codes(&[0; 8]);
        assert!(decode_tick(&[good], 2).is_err());
    }
}
