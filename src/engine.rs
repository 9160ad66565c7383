// src/engine.rs
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::acquisition::{ByteStream, Oscilloscope};
use crate::config::ScopeConfig;
use crate::types::{ScopeCommand, ScopeMessage};

/// Commands handled per tick before the next pump.
const MAX_COMMANDS_PER_TICK: usize = 10;

/// Control-surface side of a running acquisition thread.
pub struct ScopeHandle {
    tx_cmd: Sender<ScopeCommand>,
    rx: Receiver<ScopeMessage>,
    thread: Option<JoinHandle<()>>,
}

impl ScopeHandle {
    /// Returns false once the acquisition thread has exited.
    pub fn send(&self, cmd: ScopeCommand) -> bool {
        self.tx_cmd.send(cmd).is_ok()
    }

    pub fn try_recv(&self) -> Option<ScopeMessage> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ScopeMessage, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Stops the thread and waits for it; the stream is closed on the way out.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx_cmd.send(ScopeCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("acquisition thread panicked");
            }
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Flow {
    Continue,
    Exit,
}

/// Runs `scope` on its own thread, pumping every `pump_period` and
/// publishing snapshots at most every `publish_interval`.
///
/// The thread is the only writer of the scope's buffers; everything sent
/// back is an owned copy.
pub fn spawn<S>(mut scope: Oscilloscope<S>, config: &ScopeConfig) -> ScopeHandle
where
    S: ByteStream + 'static,
{
    let (tx, rx) = channel();
    let (tx_cmd, rx_cmd) = channel();
    let period = config.pump_period();
    let publish_interval = config.publish_interval();

    let thread = thread::spawn(move || {
        let mut connected = match scope.open() {
            Ok(()) => true,
            Err(e) => {
                tx.send(ScopeMessage::Disconnected(e.to_string())).ok();
                false
            }
        };
        if connected {
            tx.send(ScopeMessage::Status(true)).ok();
        }
        let mut dirty = true;
        let mut last_publish = Instant::now();

        loop {
            // 1. Commands from the control surface
            for _ in 0..MAX_COMMANDS_PER_TICK {
                let cmd = match rx_cmd.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        scope.close();
                        return;
                    }
                };
                match apply_command(&mut scope, cmd, &tx, &mut connected) {
                    Flow::Continue => dirty = true,
                    Flow::Exit => {
                        scope.close();
                        tx.send(ScopeMessage::Status(false)).ok();
                        info!("acquisition thread stopped");
                        return;
                    }
                }
            }

            // 2. Acquisition
            if connected {
                match scope.pump(Instant::now()) {
                    Ok(report) => {
                        if report.memory_mode_completed {
                            tx.send(ScopeMessage::MemoryMode(false)).ok();
                            tx.send(ScopeMessage::Paused(scope.is_paused())).ok();
                        }
                        if report.forwarded > 0 || report.memory_mode_completed {
                            dirty = true;
                        }
                    }
                    Err(e) => {
                        connected = false;
                        tx.send(ScopeMessage::Disconnected(e.to_string())).ok();
                    }
                }
            }

            // 3. Publish (rate limited)
            if dirty && last_publish.elapsed() >= publish_interval {
                if tx.send(ScopeMessage::Snapshot(scope.snapshot())).is_err() {
                    debug!("control surface gone, stopping acquisition");
                    scope.close();
                    return;
                }
                dirty = false;
                last_publish = Instant::now();
            }

            thread::sleep(period);
        }
    });

    ScopeHandle {
        tx_cmd,
        rx,
        thread: Some(thread),
    }
}

fn apply_command<S: ByteStream>(
    scope: &mut Oscilloscope<S>,
    cmd: ScopeCommand,
    tx: &Sender<ScopeMessage>,
    connected: &mut bool,
) -> Flow {
    let rejected = |e: &dyn std::fmt::Display| {
        warn!("command rejected: {e}");
        tx.send(ScopeMessage::Rejected(e.to_string())).ok();
    };
    match cmd {
        ScopeCommand::SetMode(mode) => scope.set_mode(mode),
        ScopeCommand::SetCalibration {
            channel_count,
            range,
        } => {
            if let Err(e) = scope.set_calibration_range(
                channel_count,
                range.in_min,
                range.in_max,
                range.out_min,
                range.out_max,
            ) {
                rejected(&e);
            }
        }
        ScopeCommand::StartMemoryMode(hold) => {
            let active = scope.start_memory_mode(hold);
            tx.send(ScopeMessage::MemoryMode(active)).ok();
        }
        ScopeCommand::StopMemoryMode => {
            scope.stop_memory_mode();
            tx.send(ScopeMessage::MemoryMode(false)).ok();
        }
        ScopeCommand::Pause => {
            scope.pause();
            tx.send(ScopeMessage::Paused(true)).ok();
        }
        ScopeCommand::Resume => {
            scope.resume();
            tx.send(ScopeMessage::Paused(false)).ok();
        }
        ScopeCommand::ToggleRun => {
            let running = scope.toggle_pause();
            tx.send(ScopeMessage::Paused(!running)).ok();
        }
        ScopeCommand::SetRingCapacity(capacity) => {
            if let Err(e) = scope.set_ring_capacity(capacity) {
                rejected(&e);
            }
        }
        ScopeCommand::SetTraceLength(length) => {
            if let Err(e) = scope.set_trace_length(length) {
                rejected(&e);
            }
        }
        ScopeCommand::SetNoiseBand(band) => {
            if let Err(e) = scope.set_noise_band(band) {
                rejected(&e);
            }
        }
        ScopeCommand::Reconnect => match scope.restart() {
            Ok(()) => {
                *connected = true;
                tx.send(ScopeMessage::Status(true)).ok();
            }
            Err(e) => {
                *connected = false;
                tx.send(ScopeMessage::Disconnected(e.to_string())).ok();
            }
        },
        ScopeCommand::Shutdown => return Flow::Exit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ManualStream;
    use crate::types::Mode;

    fn test_config() -> ScopeConfig {
        ScopeConfig {
            warmup_frames: 0,
            trace_length: 4,
            ring_capacity: 16,
            pump_period_us: 200,
            publish_interval_ms: 1,
            mode: Mode::Sum,
            ..ScopeConfig::default()
        }
    }

    fn wait_for<F>(handle: &ScopeHandle, mut pred: F) -> Option<ScopeMessage>
    where
        F: FnMut(&ScopeMessage) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match handle.recv_timeout(Duration::from_millis(50)) {
                Ok(msg) if pred(&msg) => return Some(msg),
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    #[test]
    fn publishes_snapshots_from_the_stream() {
        let config = test_config();
        let stream = ManualStream::new(vec![vec![0x00, 0x00, 0xFF, 0x0F]]);
        let scope = Oscilloscope::new(stream, &config).unwrap();
        let handle = spawn(scope, &config);
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::Status(true))).is_some());
        let snapshot = wait_for(&handle, |m| match m {
            ScopeMessage::Snapshot(s) => s.traces[0].last() == Some(&0.0) && s.peaks[1].vp == 3.5,
            _ => false,
        });
        assert!(snapshot.is_some());
        handle.shutdown();
    }

    #[test]
    fn commands_reach_the_engine() {
        let config = test_config();
        let scope = Oscilloscope::new(ManualStream::default(), &config).unwrap();
        let handle = spawn(scope, &config);
        assert!(handle.send(ScopeCommand::StartMemoryMode(Duration::from_millis(10))));
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::MemoryMode(true))).is_some());
        assert!(handle.send(ScopeCommand::SetTraceLength(0)));
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::Rejected(_))).is_some());
        assert!(handle.send(ScopeCommand::SetNoiseBand(f64::NAN)));
        let rejected_band = wait_for(&handle, |m| {
            matches!(m, ScopeMessage::Rejected(reason) if reason.contains("noise band"))
        });
        assert!(rejected_band.is_some());
        assert!(handle.send(ScopeCommand::ToggleRun));
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::Paused(true))).is_some());
        handle.shutdown();
    }

    #[test]
    fn stream_failure_is_reported_and_reconnect_recovers() {
        let config = test_config();
        let mut stream = ManualStream::default();
        stream.fail_next_read();
        let scope = Oscilloscope::new(stream, &config).unwrap();
        let handle = spawn(scope, &config);
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::Disconnected(_))).is_some());
        assert!(handle.send(ScopeCommand::Reconnect));
        assert!(wait_for(&handle, |m| matches!(m, ScopeMessage::Status(true))).is_some());
        handle.shutdown();
    }
}
