use thiserror::Error;
/// Coarse classification used by the cycle driver to decide what is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceIo,
    FrameValidity,
    FilterDesign,
    Dispatch,
    Configuration,
}
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("device I/O failure on {resource}: {reason}")]
    DeviceIo { resource: String, reason: String },
    #[error("{resource} not ready after {waited_ms} ms")]
    NotReady { resource: String, waited_ms: u64 },
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
    #[error("status prefix mismatch on device {device}: got {found:02X?}")]
    StatusMismatch { device: usize, found: [u8; 3] },
    #[error("device count mismatch: expected {expected} frames, got {actual}")]
    FrameCountMismatch { expected: usize, actual: usize },
    #[error("invalid filter {filter}: {reason}")]
    FilterDesign { filter: String, reason: String },
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("window length must be greater than zero")]
    InvalidWindow,
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("dispatch to {sink} failed: {reason}")]
    Dispatch { sink: String, reason: String },
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl DriverError {
    pub fn device_io(resource: impl Into<String>, reason: impl ToString) -> Self {
        DriverError::DeviceIo {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
    pub fn dispatch(sink: impl Into<String>, reason: impl ToString) -> Self {
        DriverError::Dispatch {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }
    pub fn filter_design(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::FilterDesign {
            filter: filter.into(),
            reason: reason.into(),
        }
    }
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::DeviceIo { .. } | DriverError::NotReady { .. } => ErrorKind::DeviceIo,
            DriverError::FrameTooShort { .. }
            | DriverError::StatusMismatch { .. }
            | DriverError::FrameCountMismatch { .. } => ErrorKind::FrameValidity,
            DriverError::FilterDesign { .. } => ErrorKind::FilterDesign,
            DriverError::Dispatch { .. } | DriverError::Plot(_) => ErrorKind::Dispatch,
            DriverError::InvalidSampleRate
            | DriverError::InvalidWindow
            | DriverError::ChannelMismatch { .. }
            | DriverError::Config(_) => ErrorKind::Configuration,
        }
    }
    /// Only bus and data-ready failures abort acquisition.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::DeviceIo
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for DriverError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        DriverError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for DriverError {
    fn from(value: image::ImageError) -> Self {
        DriverError::Plot(value.to_string())
    }
}
