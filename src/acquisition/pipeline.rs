use std::time::{Duration, Instant};
use log::{debug, info, warn};
use crate::acquisition::arithmetic::{combine, Combined};
use crate::acquisition::calibrate::{Calibration, CalibratedFrame};
use crate::acquisition::demux::{ChannelDemux, Frame};
use crate::acquisition::fft::{PeakStats, SpectralAnalyzer, SpectralReport};
use crate::acquisition::stream::{ByteStream, StreamReader};
use crate::acquisition::trigger::{TriggerController, TriggerEvent, TriggerPhase, TriggerState};
use crate::acquisition::{AcquisitionError, ConfigurationError, RingBuffer, TraceBuffer};
use crate::config::ScopeConfig;
use crate::types::Mode;
/// Everything the engine keeps for one channel.
struct ChannelState {
    ring: RingBuffer,
    trace: TraceBuffer,
    report: SpectralReport,
}
impl ChannelState {
    fn new(ring_capacity: usize, trace_length: usize) -> Result<Self, ConfigurationError> {
        Ok(Self {
            ring: RingBuffer::new(ring_capacity)?,
            trace: TraceBuffer::new(trace_length)?,
            report: SpectralReport::default(),
        })
    }
}
fn channel_table(
    channel_count: usize,
    ring_capacity: usize,
    trace_length: usize,
) -> Result<Box<[ChannelState]>, ConfigurationError> {
    (0..channel_count)
        .map(|_| ChannelState::new(ring_capacity, trace_length))
        .collect()
}
/// What one pump tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub bytes_read: usize,
    /// Frames calibrated into the ring buffers.
    pub frames: usize,
    /// Frames that reached the traces.
    pub forwarded: usize,
    /// Frames held back by memory mode.
    pub filtered: usize,
    /// Frames thrown away during warm-up.
    pub discarded: usize,
    /// Trace updates skipped because of an arithmetic error.
    pub arithmetic_errors: usize,
    pub memory_mode_completed: bool,
}
/// Read-only copy of everything the display needs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeSnapshot {
    pub mode: Mode,
    pub traces: Vec<Vec<f64>>,
    pub peaks: Vec<PeakStats>,
    pub frequencies_hz: Vec<Vec<f64>>,
    pub memory_mode_active: bool,
    pub paused: bool,
}
/// Acquisition and analysis engine.
///
/// Owns the stream and every per-channel buffer; callers only ever get
/// copies out. The channel table is sized when the channel count is set
/// and indexed by channel id.
pub struct Oscilloscope<S: ByteStream> {
    reader: StreamReader<S>,
    demux: ChannelDemux,
    calibration: Calibration,
    channels: Box<[ChannelState]>,
    analyzer: SpectralAnalyzer,
    trigger: TriggerController,
    mode: Mode,
    sample_rate_hz: f64,
    analysis_every_frames: usize,
    frames_since_analysis: usize,
    warmup_frames: usize,
    warmup_remaining: usize,
    hold_capture: bool,
    paused: bool,
    halted: bool,
}
impl<S: ByteStream> Oscilloscope<S> {
    pub fn new(stream: S, config: &ScopeConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            reader: StreamReader::new(stream, config.max_read_bytes),
            demux: ChannelDemux::new(config.channel_count)?,
            calibration: config.calibration.to_calibration()?,
            channels: channel_table(
                config.channel_count,
                config.ring_capacity,
                config.trace_length,
            )?,
            analyzer: SpectralAnalyzer::with_size(config.ring_capacity),
            trigger: TriggerController::new(config.noise_band),
            mode: config.mode,
            sample_rate_hz: config.sample_rate_hz,
            analysis_every_frames: config.analysis_every_frames,
            frames_since_analysis: 0,
            warmup_frames: config.warmup_frames,
            warmup_remaining: config.warmup_frames,
            hold_capture: config.hold_capture,
            paused: false,
            halted: true,
        })
    }
    // ---- stream lifecycle ----
    /// Opens the stream and starts a fresh warm-up.
    pub fn open(&mut self) -> Result<(), AcquisitionError> {
        if let Err(e) = self.reader.open() {
            self.halted = true;
            warn!("failed to open stream: {e}");
            return Err(e.into());
        }
        self.demux.reset();
        self.warmup_remaining = self.warmup_frames;
        self.halted = false;
        info!("acquisition started");
        Ok(())
    }
    /// Releases the stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.reader.close();
        self.halted = true;
    }
    pub fn restart(&mut self) -> Result<(), AcquisitionError> {
        self.close();
        self.open()
    }
    /// Input held back by the demultiplexer, for framing diagnostics.
    pub fn demux_pending_bytes(&self) -> usize {
        self.demux.pending_bytes()
    }
    pub fn is_running(&self) -> bool {
        !self.halted
    }
    pub fn stream(&self) -> &S {
        self.reader.stream()
    }
    pub fn stream_mut(&mut self) -> &mut S {
        self.reader.stream_mut()
    }
    // ---- acquisition ----
    /// One timer tick: drain the stream and process every complete frame.
    ///
    /// Never waits for data. A stream failure halts acquisition until
    /// [`restart`](Self::restart); arithmetic failures only skip the
    /// affected trace update.
    pub fn pump(&mut self, now: Instant) -> Result<PumpReport, AcquisitionError> {
        if self.halted {
            return Err(AcquisitionError::Halted);
        }
        let mut report = PumpReport::default();
        if let Some(TriggerEvent::Completed) = self.trigger.poll(now) {
            report.memory_mode_completed = true;
            info!("memory mode capture finished");
            if self.hold_capture {
                self.paused = true;
            }
        }
        if self.paused {
            return Ok(report);
        }
        let bytes = match self.reader.drain() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("stream failed, halting acquisition: {e}");
                self.reader.close();
                self.halted = true;
                return Err(e.into());
            }
        };
        report.bytes_read = bytes.len();
        for frame in self.demux.feed(bytes) {
            ingest_frame(
                &mut Ingest {
                    calibration: &self.calibration,
                    channels: &mut self.channels,
                    analyzer: &mut self.analyzer,
                    trigger: &mut self.trigger,
                    mode: self.mode,
                    analysis_every_frames: self.analysis_every_frames,
                    frames_since_analysis: &mut self.frames_since_analysis,
                    warmup_remaining: &mut self.warmup_remaining,
                },
                &frame,
                now,
                &mut report,
            );
        }
        Ok(report)
    }
    // ---- display interface ----
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
    /// Oldest-to-newest trace samples for left-to-right plotting.
    pub fn trace_snapshot(&self, channel: usize) -> Option<Vec<f64>> {
        self.channels.get(channel).map(|c| c.trace.snapshot())
    }
    pub fn trace_revision(&self, channel: usize) -> Option<u64> {
        self.channels.get(channel).map(|c| c.trace.revision())
    }
    pub fn ring_snapshot(&self, channel: usize) -> Option<Vec<f64>> {
        self.channels.get(channel).map(|c| c.ring.snapshot())
    }
    pub fn peak_stats(&self, channel: usize) -> Option<PeakStats> {
        self.channels.get(channel).map(|c| c.report.peak_stats())
    }
    pub fn dominant_frequencies(&self, channel: usize) -> Option<Vec<f64>> {
        self.channels
            .get(channel)
            .map(|c| c.report.frequencies_hz(self.sample_rate_hz))
    }
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            mode: self.mode,
            traces: self.channels.iter().map(|c| c.trace.snapshot()).collect(),
            peaks: self.channels.iter().map(|c| c.report.peak_stats()).collect(),
            frequencies_hz: self
                .channels
                .iter()
                .map(|c| c.report.frequencies_hz(self.sample_rate_hz))
                .collect(),
            memory_mode_active: self.trigger.is_active(),
            paused: self.paused,
        }
    }
    // ---- control surface ----
    pub fn mode(&self) -> Mode {
        self.mode
    }
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            info!("mode changed to {mode}");
        }
        self.mode = mode;
    }
    /// Changes channel count and calibration together. On a new channel
    /// count the frame layout changes, so partial input and buffers start over.
    pub fn set_calibration_range(
        &mut self,
        channel_count: usize,
        in_min: f64,
        in_max: f64,
        out_min: f64,
        out_max: f64,
    ) -> Result<(), ConfigurationError> {
        let calibration = Calibration::new(in_min, in_max, out_min, out_max)?;
        if channel_count != self.channels.len() {
            let demux = ChannelDemux::new(channel_count)?;
            let channels = channel_table(
                channel_count,
                self.analyzer.fft_size(),
                self.channels[0].trace.len(),
            )?;
            self.demux = demux;
            self.channels = channels;
            info!("channel count set to {channel_count}");
        }
        self.calibration = calibration;
        Ok(())
    }
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }
    /// Toggles memory mode; returns whether it is now active.
    pub fn start_memory_mode(&mut self, hold_time: Duration) -> bool {
        self.trigger.start_memory_mode(hold_time)
    }
    pub fn stop_memory_mode(&mut self) {
        self.trigger.stop_memory_mode()
    }
    pub fn noise_band(&self) -> f64 {
        self.trigger.noise_band()
    }
    pub fn set_noise_band(&mut self, noise_band: f64) -> Result<(), ConfigurationError> {
        self.trigger.set_noise_band(noise_band)?;
        debug!("noise band set to {noise_band} V");
        Ok(())
    }
    pub fn memory_mode_active(&self) -> bool {
        self.trigger.is_active()
    }
    pub fn trigger_phase(&self) -> TriggerPhase {
        self.trigger.phase()
    }
    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }
    /// Skips reads; partial frames are kept so alignment survives.
    pub fn pause(&mut self) {
        self.paused = true;
    }
    pub fn resume(&mut self) {
        self.paused = false;
    }
    /// Stop/Run. Returns true when running afterwards.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        !self.paused
    }
    pub fn is_paused(&self) -> bool {
        self.paused
    }
    /// Replaces every ring buffer (zero-filled) with one of `capacity` slots.
    pub fn set_ring_capacity(&mut self, capacity: usize) -> Result<(), ConfigurationError> {
        for channel in self.channels.iter_mut() {
            channel.ring = RingBuffer::new(capacity)?;
            channel.report = SpectralReport::default();
        }
        self.analyzer = SpectralAnalyzer::with_size(capacity);
        self.frames_since_analysis = 0;
        debug!("ring capacity set to {capacity}");
        Ok(())
    }
    /// Replaces every trace (zero-filled) with one of `length` samples.
    pub fn set_trace_length(&mut self, length: usize) -> Result<(), ConfigurationError> {
        for channel in self.channels.iter_mut() {
            channel.trace = TraceBuffer::new(length)?;
        }
        debug!("trace length set to {length}");
        Ok(())
    }
}
/// Borrowed engine state touched while processing one frame.
struct Ingest<'a> {
    calibration: &'a Calibration,
    channels: &'a mut [ChannelState],
    analyzer: &'a mut SpectralAnalyzer,
    trigger: &'a mut TriggerController,
    mode: Mode,
    analysis_every_frames: usize,
    frames_since_analysis: &'a mut usize,
    warmup_remaining: &'a mut usize,
}
fn ingest_frame(state: &mut Ingest<'_>, frame: &Frame, now: Instant, report: &mut PumpReport) {
    if *state.warmup_remaining > 0 {
        *state.warmup_remaining -= 1;
        report.discarded += 1;
        return;
    }
    let volts: CalibratedFrame = state.calibration.apply_frame(frame);
    for (channel, &value) in state.channels.iter_mut().zip(volts.values()) {
        channel.ring.push(value);
    }
    report.frames += 1;
    if state.trigger.admit(volts.values(), now) {
        match combine(state.mode, &volts) {
            Ok(Combined::PerChannel(values)) => {
                for (channel, &value) in state.channels.iter_mut().zip(values) {
                    channel.trace.shift_in(value);
                }
                report.forwarded += 1;
            }
            Ok(Combined::Channel0(value)) => {
                state.channels[0].trace.shift_in(value);
                report.forwarded += 1;
            }
            Ok(Combined::Nothing) => {}
            Err(e) => {
                debug!("trace update skipped: {e}");
                report.arithmetic_errors += 1;
            }
        }
    } else {
        report.filtered += 1;
    }
    *state.frames_since_analysis += 1;
    if *state.frames_since_analysis >= state.analysis_every_frames {
        for channel in state.channels.iter_mut() {
            state.analyzer.analyze_into(&channel.ring, &mut channel.report);
        }
        *state.frames_since_analysis = 0;
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ManualStream;
    use crate::acquisition::StreamError;
    fn config() -> ScopeConfig {
        ScopeConfig {
            warmup_frames: 0,
            ring_capacity: 8,
            trace_length: 4,
            ..ScopeConfig::default()
        }
    }
    fn encode(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
    fn scope_with(chunks: Vec<Vec<u8>>, config: &ScopeConfig) -> Oscilloscope<ManualStream> {
        let mut scope = Oscilloscope::new(ManualStream::new(chunks), config).unwrap();
        scope.open().unwrap();
        scope
    }
    #[test]
    fn sum_mode_forwards_single_value_to_trace_zero() {
        let mut config = config();
        config.mode = Mode::Sum;
        let mut scope = scope_with(vec![vec![0x00, 0x00, 0xFF, 0x0F]], &config);
        let report = scope.pump(Instant::now()).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.forwarded, 1);
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.0, 0.0, 0.0]);
        assert_eq!(scope.trace_revision(0), Some(1));
        assert_eq!(scope.trace_revision(1), Some(0));
        assert_eq!(
            scope.ring_snapshot(1).unwrap().last().copied(),
            Some(3.5)
        );
    }
    #[test]
    fn simple_mode_updates_each_trace() {
        let mut scope = scope_with(vec![encode(&[0, 4095, 4095, 0])], &config());
        scope.pump(Instant::now()).unwrap();
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.0, -3.5, 3.5]);
        assert_eq!(scope.trace_snapshot(1).unwrap(), vec![0.0, 0.0, 3.5, -3.5]);
    }
    #[test]
    fn quotient_by_zero_leaves_trace_untouched() {
        let mut config = config();
        config.mode = Mode::Quotient;
        config.calibration.out_min = 0.0;
        config.calibration.out_max = 4095.0;
        // Channel A = 4.0 V, channel B = 0.0 V.
        let mut scope = scope_with(vec![encode(&[4, 0])], &config);
        let report = scope.pump(Instant::now()).unwrap();
        assert_eq!(report.arithmetic_errors, 1);
        assert_eq!(report.forwarded, 0);
        assert_eq!(scope.trace_revision(0), Some(0));
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0; 4]);
        assert!(scope.is_running());
    }
    #[test]
    fn peak_and_frequencies_follow_the_ring() {
        let mut scope = scope_with(vec![encode(&[4095, 2048, 0, 2048])], &config());
        scope.pump(Instant::now()).unwrap();
        let stats = scope.peak_stats(0).unwrap();
        assert_eq!(stats.vp, 3.5);
        assert_eq!(stats.vpp, 7.0);
        assert_eq!(stats.vrms, 2.47);
        assert!(scope.dominant_frequencies(0).is_some());
        assert!(scope.peak_stats(2).is_none());
    }
    #[test]
    fn warmup_frames_are_discarded() {
        let mut config = config();
        config.warmup_frames = 2;
        let mut scope = scope_with(vec![encode(&[4095, 4095, 4095, 4095, 0, 0])], &config);
        let report = scope.pump(Instant::now()).unwrap();
        assert_eq!(report.discarded, 2);
        assert_eq!(report.frames, 1);
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.0, 0.0, -3.5]);
    }
    #[test]
    fn pause_keeps_partial_frames_aligned() {
        let bytes = encode(&[0, 4095, 4095, 0]);
        let mut scope = scope_with(
            vec![bytes[..5].to_vec(), bytes[5..].to_vec()],
            &config(),
        );
        let t = Instant::now();
        assert_eq!(scope.pump(t).unwrap().frames, 1);
        scope.pause();
        let paused = scope.pump(t).unwrap();
        assert_eq!(paused.bytes_read, 0);
        assert_eq!(scope.stream().pending_chunks(), 1);
        assert_eq!(scope.demux_pending_bytes(), 1);
        assert!(scope.toggle_pause());
        assert_eq!(scope.pump(t).unwrap().frames, 1);
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.0, -3.5, 3.5]);
    }
    #[test]
    fn memory_mode_filters_noise_then_captures_and_holds() {
        let mut config = config();
        config.calibration = crate::config::CalibrationRange {
            in_min: 0.0,
            in_max: 100.0,
            out_min: 0.0,
            out_max: 1.0,
        };
        config.channel_count = 1;
        let hold = Duration::from_millis(100);
        let t0 = Instant::now();
        // 0.05 V twice (noise), then 0.5 V (signal), then 0.0 V.
        let mut scope = scope_with(vec![encode(&[5, 5, 50, 0])], &config);
        assert!(scope.start_memory_mode(hold));
        let report = scope.pump(t0).unwrap();
        assert_eq!(report.filtered, 2);
        assert_eq!(report.forwarded, 2);
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.0, 0.5, 0.0]);
        assert_eq!(scope.trigger_phase(), TriggerPhase::CapturedCounting);
        scope.stream_mut().push_chunk(encode(&[77]));
        let done = scope.pump(t0 + hold).unwrap();
        assert!(done.memory_mode_completed);
        assert!(!scope.memory_mode_active());
        assert!(scope.is_paused());
        assert_eq!(done.bytes_read, 0);
        scope.resume();
        scope.pump(t0 + hold).unwrap();
        assert_eq!(scope.trace_snapshot(0).unwrap(), vec![0.0, 0.5, 0.0, 0.77]);
    }
    #[test]
    fn huge_hold_time_keeps_capturing_without_panicking() {
        let mut config = config();
        config.channel_count = 1;
        let t0 = Instant::now();
        let mut scope = scope_with(vec![encode(&[4095, 2048])], &config);
        assert!(scope.start_memory_mode(Duration::MAX));
        let report = scope.pump(t0).unwrap();
        assert_eq!(report.forwarded, 2);
        assert_eq!(scope.trigger_phase(), TriggerPhase::CapturedCounting);
        assert!(!scope.pump(t0 + Duration::from_secs(86_400)).unwrap().memory_mode_completed);
        assert!(scope.memory_mode_active());
    }
    #[test]
    fn noise_band_changes_what_memory_mode_drops() {
        let mut config = config();
        config.channel_count = 1;
        let t0 = Instant::now();
        // 2150 -> 0.18 V: signal for the default band, noise for 0.5 V.
        let mut scope = scope_with(vec![encode(&[2150])], &config);
        scope.set_noise_band(0.5).unwrap();
        assert_eq!(scope.noise_band(), 0.5);
        assert!(scope.set_noise_band(f64::NAN).is_err());
        scope.start_memory_mode(Duration::from_millis(100));
        let report = scope.pump(t0).unwrap();
        assert_eq!(report.filtered, 1);
        assert_eq!(scope.trace_revision(0), Some(0));
    }
    #[test]
    fn nan_calibration_bound_is_rejected() {
        let mut scope = scope_with(vec![], &config());
        assert_eq!(
            scope.set_calibration_range(2, f64::NAN, 4095.0, -3.5, 3.5),
            Err(ConfigurationError::NonFiniteCalibration)
        );
        assert_eq!(scope.calibration(), Calibration::default());
    }
    #[test]
    fn stream_failure_halts_until_restart() {
        let mut scope = scope_with(vec![], &config());
        scope.stream_mut().fail_next_read();
        let t = Instant::now();
        assert!(matches!(
            scope.pump(t),
            Err(AcquisitionError::Stream(StreamError::Closed))
        ));
        assert!(matches!(scope.pump(t), Err(AcquisitionError::Halted)));
        assert_eq!(scope.stream().close_count(), 1);
        scope.restart().unwrap();
        assert!(scope.pump(t).is_ok());
        scope.close();
        scope.close();
        assert_eq!(scope.stream().close_count(), 2);
    }
    #[test]
    fn reconfiguration_rebuilds_buffers() {
        let mut scope = scope_with(vec![], &config());
        scope.set_trace_length(6).unwrap();
        assert_eq!(scope.trace_snapshot(0).unwrap().len(), 6);
        scope.set_ring_capacity(16).unwrap();
        assert_eq!(scope.ring_snapshot(1).unwrap().len(), 16);
        assert_eq!(
            scope.set_ring_capacity(0),
            Err(ConfigurationError::ZeroRingCapacity)
        );
        scope
            .set_calibration_range(3, 0.0, 1023.0, 0.0, 5.0)
            .unwrap();
        assert_eq!(scope.channel_count(), 3);
        assert_eq!(scope.trace_snapshot(2).unwrap().len(), 6);
        assert_eq!(
            scope.set_calibration_range(3, 1.0, 1.0, 0.0, 5.0),
            Err(ConfigurationError::ZeroCalibrationSpan(1.0))
        );
        assert_eq!(scope.calibration().in_range(), (0.0, 1023.0));
    }
    #[test]
    fn construction_rejects_bad_config() {
        let bad = ScopeConfig {
            channel_count: 0,
            ..ScopeConfig::default()
        };
        assert!(matches!(
            Oscilloscope::new(ManualStream::default(), &bad),
            Err(ConfigurationError::ZeroChannels)
        ));
    }
}
