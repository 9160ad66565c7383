// src/main.rs
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};
use softscope::{engine, Oscilloscope, ScopeConfig, ScopeMessage};

// How often the headless front end logs readings.
const REPORT_EVERY: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(path) => ScopeConfig::load(&path)?,
        None => {
            info!("no config given, using defaults");
            ScopeConfig::default()
        }
    };
    info!("source: {}", config.source.describe());
    let stream = config.source.build_stream();
    let scope = Oscilloscope::new(stream, &config).context("invalid scope configuration")?;
    let handle = engine::spawn(scope, &config);

    let mut last_report: Option<Instant> = None;
    loop {
        let msg = match handle.recv_timeout(Duration::from_millis(250)) {
            Ok(msg) => msg,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };
        match msg {
            ScopeMessage::Status(connected) => info!("stream connected: {connected}"),
            ScopeMessage::Disconnected(reason) => {
                warn!("acquisition stopped: {reason}");
                break;
            }
            ScopeMessage::Rejected(reason) => warn!("rejected: {reason}"),
            ScopeMessage::MemoryMode(active) => info!("memory mode: {active}"),
            ScopeMessage::Paused(paused) => info!("paused: {paused}"),
            ScopeMessage::Snapshot(snapshot) => {
                if last_report.is_some_and(|t| t.elapsed() < REPORT_EVERY) {
                    continue;
                }
                last_report = Some(Instant::now());
                for (ch, peak) in snapshot.peaks.iter().enumerate() {
                    let freqs = snapshot
                        .frequencies_hz
                        .get(ch)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    info!(
                        "[{}] ch{ch}: Vp {:.2} V  Vpp {:.2} V  Vrms {:.2} V  f {:?} Hz",
                        snapshot.mode, peak.vp, peak.vpp, peak.vrms, freqs
                    );
                }
            }
        }
    }
    handle.shutdown();
    Ok(())
}
