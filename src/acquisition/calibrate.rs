use crate::acquisition::demux::{Frame, MAX_CHANNELS};
use crate::acquisition::ConfigurationError;
/// Linear map from raw device codes to volts, rounded to 2 decimals.
///
/// Raw values outside `[in_min, in_max]` are extrapolated, not clamped.
pub fn calibrate(
    raw: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
) -> Result<f64, ConfigurationError> {
    Ok(Calibration::new(in_min, in_max, out_min, out_max)?.apply(raw))
}
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
}
impl Calibration {
    pub fn new(
        in_min: f64,
        in_max: f64,
        out_min: f64,
        out_max: f64,
    ) -> Result<Self, ConfigurationError> {
        if ![in_min, in_max, out_min, out_max].iter().all(|v| v.is_finite()) {
            return Err(ConfigurationError::NonFiniteCalibration);
        }
        if in_max == in_min {
            return Err(ConfigurationError::ZeroCalibrationSpan(in_min));
        }
        Ok(Self {
            in_min,
            in_max,
            out_min,
            out_max,
        })
    }
    pub fn in_range(&self) -> (f64, f64) {
        (self.in_min, self.in_max)
    }
    pub fn apply(&self, raw: f64) -> f64 {
        round2(
            (raw - self.in_min) * (self.out_max - self.out_min) / (self.in_max - self.in_min)
                + self.out_min,
        )
    }
    pub fn apply_frame(&self, frame: &Frame) -> CalibratedFrame {
        let mut out = CalibratedFrame {
            values: [0.0; MAX_CHANNELS],
            len: frame.channel_count(),
        };
        for (slot, &raw) in out.values.iter_mut().zip(frame.raw()) {
            *slot = self.apply(f64::from(raw));
        }
        out
    }
}
impl Default for Calibration {
    /// 12-bit ADC spanning +/-3.5 V.
    fn default() -> Self {
        Self {
            in_min: 0.0,
            in_max: 4095.0,
            out_min: -3.5,
            out_max: 3.5,
        }
    }
}
/// A frame converted to volts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedFrame {
    values: [f64; MAX_CHANNELS],
    len: usize,
}
impl CalibratedFrame {
    pub fn from_values(values: &[f64]) -> Self {
        let mut frame = Self {
            values: [0.0; MAX_CHANNELS],
            len: values.len().min(MAX_CHANNELS),
        };
        frame.values[..frame.len].copy_from_slice(&values[..frame.len]);
        frame
    }
    pub fn values(&self) -> &[f64] {
        &self.values[..self.len]
    }
    pub fn channel_count(&self) -> usize {
        self.len
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn endpoints_and_midpoint() {
        assert_eq!(calibrate(0.0, 0.0, 4095.0, -3.5, 3.5).unwrap(), -3.5);
        assert_eq!(calibrate(4095.0, 0.0, 4095.0, -3.5, 3.5).unwrap(), 3.5);
        let mid = calibrate(2047.0, 0.0, 4095.0, -3.5, 3.5).unwrap();
        assert!(mid.abs() <= 0.01, "midpoint was {mid}");
    }
    #[test]
    fn rounds_to_two_decimals() {
        let cal = Calibration::default();
        let v = cal.apply(1000.0);
        assert_eq!(v, (v * 100.0).round() / 100.0);
        assert_eq!(v, -1.79);
    }
    #[test]
    fn extrapolates_out_of_range_codes() {
        let cal = Calibration::new(0.0, 100.0, 0.0, 1.0).unwrap();
        assert_eq!(cal.apply(200.0), 2.0);
        assert_eq!(cal.apply(-100.0), -1.0);
    }
    #[test]
    fn zero_span_is_a_configuration_error() {
        assert_eq!(
            calibrate(5.0, 10.0, 10.0, -1.0, 1.0),
            Err(ConfigurationError::ZeroCalibrationSpan(10.0))
        );
    }
    #[test]
    fn non_finite_bounds_are_rejected() {
        assert_eq!(
            Calibration::new(f64::NAN, 4095.0, -3.5, 3.5),
            Err(ConfigurationError::NonFiniteCalibration)
        );
        assert_eq!(
            Calibration::new(0.0, 4095.0, -3.5, f64::INFINITY),
            Err(ConfigurationError::NonFiniteCalibration)
        );
    }
    #[test]
    fn calibrates_whole_frames() {
        let frame = Frame::from_raw(&[0, 4095]);
        let volts = Calibration::default().apply_frame(&frame);
        assert_eq!(volts.values(), &[-3.5, 3.5]);
    }
}
