use crate::acquisition::calibrate::CalibratedFrame;
use crate::acquisition::ArithmeticError;
use crate::types::Mode;
/// What a frame contributes to the traces under a given [`Mode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Combined<'a> {
    /// Each channel's value goes to its own trace.
    PerChannel(&'a [f64]),
    /// A single value for trace 0; other traces are left alone.
    Channel0(f64),
    /// Binary mode with fewer than two channels: nothing to update.
    Nothing,
}
pub fn combine(mode: Mode, frame: &CalibratedFrame) -> Result<Combined<'_>, ArithmeticError> {
    let values = frame.values();
    let value = match (mode, values) {
        (Mode::Simple, _) => return Ok(Combined::PerChannel(values)),
        (_, [] | [_]) => return Ok(Combined::Nothing),
        (Mode::Sum, &[a, b, ..]) => a + b,
        (Mode::Difference, &[a, b, ..]) => a - b,
        (Mode::Product, &[a, b, ..]) => a * b,
        (Mode::Quotient, &[a, b, ..]) => {
            if b == 0.0 {
                return Err(ArithmeticError::DivisionByZero { numerator: a });
            }
            a / b
        }
    };
    Ok(Combined::Channel0(value))
}
