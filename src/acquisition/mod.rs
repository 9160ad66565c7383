// src/acquisition/mod.rs
pub mod arithmetic;
pub mod buffer;
pub mod calibrate;
pub mod demux;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod serial;
pub mod stream;
pub mod trigger;
// Flat re-exports for callers outside the module
pub use arithmetic::{combine, Combined};
pub use buffer::{RingBuffer, TraceBuffer};
pub use calibrate::{calibrate, CalibratedFrame, Calibration};
pub use demux::{ChannelDemux, Frame, Frames, MAX_CHANNELS};
pub use error::{AcquisitionError, ArithmeticError, ConfigurationError, StreamError};
pub use fft::{PeakStats, SpectralAnalyzer, SpectralReport};
pub use pipeline::{Oscilloscope, PumpReport, ScopeSnapshot};
pub use serial::{SerialSettings, SerialStream};
pub use stream::{ByteStream, ManualStream, SocketStream, StreamReader};
pub use trigger::{
    TriggerController, TriggerEvent, TriggerPhase, TriggerState, DEFAULT_NOISE_BAND,
};
