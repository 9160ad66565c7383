use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::acquisition::{
    ByteStream, Calibration, ConfigurationError, SerialSettings, SerialStream, SocketStream,
    DEFAULT_NOISE_BAND, MAX_CHANNELS,
};
use crate::types::Mode;
/// Raw-code to volts mapping as written in the config file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationRange {
    pub in_min: f64,
    pub in_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}
impl CalibrationRange {
    pub fn to_calibration(&self) -> Result<Calibration, ConfigurationError> {
        Calibration::new(self.in_min, self.in_max, self.out_min, self.out_max)
    }
}
impl Default for CalibrationRange {
    fn default() -> Self {
        // 12-bit ADC, +/-3.5 V front end.
        Self {
            in_min: 0.0,
            in_max: 4095.0,
            out_min: -3.5,
            out_max: 3.5,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_serial_timeout_ms")]
        timeout_ms: u64,
    },
    Socket {
        address: String,
    },
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_serial_timeout_ms() -> u64 {
    10
}
impl SourceConfig {
    /// Builds the (still closed) byte stream for this source.
    pub fn build_stream(&self) -> Box<dyn ByteStream> {
        match self {
            SourceConfig::Serial {
                port,
                baud_rate,
                timeout_ms,
            } => {
                let mut settings = SerialSettings::new(port.clone(), *baud_rate);
                settings.timeout = Duration::from_millis(*timeout_ms);
                Box::new(SerialStream::new(settings))
            }
            SourceConfig::Socket { address } => Box::new(SocketStream::new(address.clone())),
        }
    }
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::Serial {
                port, baud_rate, ..
            } => format!("serial {port} @ {baud_rate}"),
            SourceConfig::Socket { address } => format!("socket {address}"),
        }
    }
}
impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Serial {
            port: "/dev/ttyUSB0".to_owned(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub channel_count: usize,
    pub calibration: CalibrationRange,
    /// Samples per channel kept for peak/FFT analysis.
    pub ring_capacity: usize,
    /// Samples per channel on screen.
    pub trace_length: usize,
    pub sample_rate_hz: f64,
    pub noise_band: f64,
    /// Run spectral analysis after this many frames (1 = every frame).
    pub analysis_every_frames: usize,
    pub max_read_bytes: usize,
    /// Frames thrown away right after the stream opens.
    pub warmup_frames: usize,
    /// Pause ingestion when a memory-mode capture finishes.
    pub hold_capture: bool,
    pub pump_period_us: u64,
    pub publish_interval_ms: u64,
    pub mode: Mode,
    pub source: SourceConfig,
}
impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            calibration: CalibrationRange::default(),
            ring_capacity: 1024,
            trace_length: 500,
            sample_rate_hz: 10_000.0,
            noise_band: DEFAULT_NOISE_BAND,
            analysis_every_frames: 1,
            max_read_bytes: 4096,
            warmup_frames: 20,
            hold_capture: true,
            pump_period_us: 500,
            publish_interval_ms: 33,
            mode: Mode::Simple,
            source: SourceConfig::default(),
        }
    }
}
impl ScopeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid scope config JSON")?;
        config.validate()?;
        Ok(config)
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.channel_count == 0 {
            return Err(ConfigurationError::ZeroChannels);
        }
        if self.channel_count > MAX_CHANNELS {
            return Err(ConfigurationError::TooManyChannels {
                requested: self.channel_count,
                max: MAX_CHANNELS,
            });
        }
        self.calibration.to_calibration()?;
        if self.ring_capacity == 0 {
            return Err(ConfigurationError::ZeroRingCapacity);
        }
        if self.trace_length == 0 {
            return Err(ConfigurationError::ZeroTraceLength);
        }
        if !self.noise_band.is_finite() {
            return Err(ConfigurationError::InvalidNoiseBand(self.noise_band));
        }
        if !(self.sample_rate_hz > 0.0) {
            return Err(ConfigurationError::InvalidSampleRate);
        }
        if self.max_read_bytes == 0 {
            return Err(ConfigurationError::ZeroReadSize);
        }
        if self.analysis_every_frames == 0 {
            return Err(ConfigurationError::ZeroAnalysisCadence);
        }
        Ok(())
    }
    pub fn pump_period(&self) -> Duration {
        Duration::from_micros(self.pump_period_us)
    }
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }
}
