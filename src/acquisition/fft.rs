use std::f64::consts::SQRT_2;
use std::sync::Arc;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use crate::acquisition::RingBuffer;
/// Result of analysing one channel's ring buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralReport {
    /// Largest sample currently in the ring.
    pub peak: f64,
    /// Bins above half the strongest magnitude, in cycles per sample,
    /// ascending and without duplicates.
    pub frequencies: Vec<f64>,
}
impl SpectralReport {
    pub fn peak_stats(&self) -> PeakStats {
        PeakStats::from_peak(self.peak)
    }
    pub fn frequencies_hz(&self, sample_rate_hz: f64) -> Vec<f64> {
        self.frequencies.iter().map(|f| f * sample_rate_hz).collect()
    }
}
/// Voltage readouts derived from a peak value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PeakStats {
    pub vp: f64,
    pub vpp: f64,
    pub vrms: f64,
}
impl PeakStats {
    pub fn from_peak(peak: f64) -> Self {
        let vp = round2(peak);
        Self {
            vp,
            vpp: round2(vp * 2.0),
            vrms: round2(vp / SQRT_2),
        }
    }
}
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
/// Frequency of bin `k` in an `n`-point transform, negative in the upper half.
fn bin_frequency(k: usize, n: usize) -> f64 {
    if k < (n + 1) / 2 {
        k as f64 / n as f64
    } else {
        (k as f64 - n as f64) / n as f64
    }
}
/// Runs a forward FFT over ring buffers of one fixed size.
///
/// Plan and work buffers are created once, so repeated analysis does not
/// allocate beyond the returned frequency list.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
    magnitudes: Vec<f64>,
}
impl SpectralAnalyzer {
    pub fn with_size(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            buffer: Vec::with_capacity(fft_size),
            scratch,
            magnitudes: Vec::with_capacity(fft_size),
        }
    }
    pub fn fft_size(&self) -> usize {
        self.fft.len()
    }
    pub fn analyze(&mut self, ring: &RingBuffer) -> SpectralReport {
        let mut report = SpectralReport::default();
        self.analyze_into(ring, &mut report);
        report
    }
    /// Same as [`analyze`](Self::analyze), reusing `report`'s storage.
    pub fn analyze_into(&mut self, ring: &RingBuffer, report: &mut SpectralReport) {
        report.peak = ring.max();
        report.frequencies.clear();
        let n = self.fft_size();
        self.buffer.clear();
        self.buffer
            .extend(ring.iter().take(n).map(|v| Complex64::new(v, 0.0)));
        self.buffer.resize(n, Complex64::new(0.0, 0.0));
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        self.magnitudes.clear();
        self.magnitudes.extend(self.buffer.iter().map(|c| c.norm()));
        let max = self.magnitudes.iter().copied().fold(0.0, f64::max);
        let threshold = 0.5 * max;
        for (k, &magnitude) in self.magnitudes.iter().enumerate() {
            if magnitude > threshold {
                report.frequencies.push(bin_frequency(k, n).abs());
            }
        }
        report
            .frequencies
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        report.frequencies.dedup();
    }
}
