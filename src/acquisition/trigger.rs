//! Memory mode: ignore idle noise until a signal shows up, then capture for
//! a fixed hold time and switch off.
use std::time::{Duration, Instant};
use log::{debug, info};
use crate::acquisition::ConfigurationError;
/// Default half-width of the noise band, in volts.
pub const DEFAULT_NOISE_BAND: f64 = 0.1;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerPhase {
    Disabled,
    ArmedWatching,
    CapturedCounting,
}
/// Read-only view of the controller for the control surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerState {
    pub armed: bool,
    pub hold_time: Duration,
    pub pending_deadline: Option<Instant>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerEvent {
    /// The hold time ran out and memory mode switched itself off.
    Completed,
}
#[derive(Clone, Copy, Debug)]
enum Phase {
    Disabled,
    Watching,
    // `None` when the hold time is too long to be represented.
    Counting { deadline: Option<Instant> },
}
pub struct TriggerController {
    phase: Phase,
    hold_time: Duration,
    noise_band: f64,
    completion_unreported: bool,
}
impl TriggerController {
    pub fn new(noise_band: f64) -> Self {
        Self {
            phase: Phase::Disabled,
            hold_time: Duration::ZERO,
            noise_band: noise_band.abs(),
            completion_unreported: false,
        }
    }
    pub fn noise_band(&self) -> f64 {
        self.noise_band
    }
    /// Only the magnitude matters; the band is symmetric around zero.
    pub fn set_noise_band(&mut self, noise_band: f64) -> Result<(), ConfigurationError> {
        if !noise_band.is_finite() {
            return Err(ConfigurationError::InvalidNoiseBand(noise_band));
        }
        self.noise_band = noise_band.abs();
        Ok(())
    }
    /// Toggles memory mode. From `Disabled` it arms with `hold_time`; from
    /// any other phase it switches off and cancels a running countdown.
    /// Returns whether memory mode is now active.
    pub fn start_memory_mode(&mut self, hold_time: Duration) -> bool {
        match self.phase {
            Phase::Disabled => {
                self.hold_time = hold_time;
                self.phase = Phase::Watching;
                self.completion_unreported = false;
                info!("memory mode armed, hold {:?}", hold_time);
                true
            }
            Phase::Watching | Phase::Counting { .. } => {
                self.stop_memory_mode();
                false
            }
        }
    }
    pub fn stop_memory_mode(&mut self) {
        if !matches!(self.phase, Phase::Disabled) {
            info!("memory mode cancelled");
        }
        self.phase = Phase::Disabled;
    }
    pub fn phase(&self) -> TriggerPhase {
        match self.phase {
            Phase::Disabled => TriggerPhase::Disabled,
            Phase::Watching => TriggerPhase::ArmedWatching,
            Phase::Counting { .. } => TriggerPhase::CapturedCounting,
        }
    }
    /// The "memory mode active" flag shown by the control surface.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Disabled)
    }
    pub fn state(&self) -> TriggerState {
        TriggerState {
            armed: self.is_active(),
            hold_time: self.hold_time,
            pending_deadline: match self.phase {
                Phase::Counting { deadline } => deadline,
                _ => None,
            },
        }
    }
    /// Decides whether a frame's samples reach the traces.
    pub fn admit(&mut self, samples: &[f64], now: Instant) -> bool {
        self.expire(now);
        match self.phase {
            Phase::Disabled | Phase::Counting { .. } => true,
            Phase::Watching => {
                let band = self.noise_band;
                if samples.iter().any(|v| v.abs() > band) {
                    self.phase = Phase::Counting {
                        deadline: now.checked_add(self.hold_time),
                    };
                    info!("memory mode captured a signal, recording {:?}", self.hold_time);
                    true
                } else {
                    false
                }
            }
        }
    }
    /// Advances the countdown. Reports completion exactly once.
    pub fn poll(&mut self, now: Instant) -> Option<TriggerEvent> {
        self.expire(now);
        std::mem::take(&mut self.completion_unreported).then_some(TriggerEvent::Completed)
    }
    fn expire(&mut self, now: Instant) {
        if let Phase::Counting {
            deadline: Some(deadline),
        } = self.phase
        {
            if now >= deadline {
                debug!("memory mode hold time elapsed");
                self.phase = Phase::Disabled;
                self.completion_unreported = true;
            }
        }
    }
}
impl Default for TriggerController {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_BAND)
    }
}
