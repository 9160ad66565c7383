// src/types.rs
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::acquisition::ScopeSnapshot;
use crate::config::CalibrationRange;

/// How a frame's channels reach the traces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every channel on its own trace.
    #[default]
    Simple,
    /// A + B on trace 0.
    Sum,
    /// A - B on trace 0.
    Difference,
    /// A * B on trace 0.
    Product,
    /// A / B on trace 0.
    Quotient,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Simple,
        Mode::Sum,
        Mode::Difference,
        Mode::Product,
        Mode::Quotient,
    ];

    /// Label used by the mode selector.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Simple => "Simple",
            Mode::Sum => "A + B",
            Mode::Difference => "A - B",
            Mode::Product => "A * B",
            Mode::Quotient => "A / B",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown mode {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    /// Accepts selector labels ("A + B") and snake_case names ("sum").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| {
                m.label() == trimmed || format!("{m:?}").eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| UnknownMode(s.to_owned()))
    }
}

// Control surface -> acquisition thread
#[derive(Clone, Debug)]
pub enum ScopeCommand {
    SetMode(Mode),
    SetCalibration {
        channel_count: usize,
        range: CalibrationRange,
    },
    /// Toggles memory mode with the given hold time.
    StartMemoryMode(Duration),
    StopMemoryMode,
    Pause,
    Resume,
    /// Stop/Run button.
    ToggleRun,
    SetRingCapacity(usize),
    SetTraceLength(usize),
    /// Half-width of the memory-mode noise band, in volts.
    SetNoiseBand(f64),
    Reconnect,
    Shutdown,
}

// Acquisition thread -> control surface
#[derive(Clone, Debug)]
pub enum ScopeMessage {
    /// Stream connected (true) or closed on request (false).
    Status(bool),
    Snapshot(ScopeSnapshot),
    /// Memory mode flag changed; `false` after a finished capture too.
    MemoryMode(bool),
    Paused(bool),
    /// The stream failed; acquisition waits for `Reconnect`.
    Disconnected(String),
    /// A command was rejected.
    Rejected(String),
}
