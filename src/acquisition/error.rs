use thiserror::Error;
/// Rejected configuration. Raised before acquisition starts, never mid-stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("calibration input range has zero span (in_min == in_max == {0})")]
    ZeroCalibrationSpan(f64),
    #[error("calibration bounds must be finite")]
    NonFiniteCalibration,
    #[error("channel count must be greater than zero")]
    ZeroChannels,
    #[error("channel count {requested} exceeds the supported maximum of {max}")]
    TooManyChannels { requested: usize, max: usize },
    #[error("ring buffer capacity must be greater than zero")]
    ZeroRingCapacity,
    #[error("trace length must be greater than zero")]
    ZeroTraceLength,
    #[error("noise band must be a finite voltage, got {0}")]
    InvalidNoiseBand(f64),
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("read size must be greater than zero")]
    ZeroReadSize,
    #[error("analysis cadence must be at least one frame")]
    ZeroAnalysisCadence,
}
/// Failures of the byte source. Acquisition halts until restarted.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },
    #[error("stream is not open")]
    NotOpen,
    #[error("stream closed unexpectedly")]
    Closed,
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
impl From<serialport::Error> for StreamError {
    fn from(value: serialport::Error) -> Self {
        StreamError::Io(value.into())
    }
}
/// Per-frame arithmetic failure; the affected trace update is skipped.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ArithmeticError {
    #[error("quotient of {numerator} by zero")]
    DivisionByZero { numerator: f64 },
}
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("acquisition halted after a stream failure; restart required")]
    Halted,
}
