use std::io::{ErrorKind, Read};
use std::time::Duration;
use log::{info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use crate::acquisition::{ByteStream, StreamError};
/// Serial line settings. The sampling firmware talks 8E1.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}
impl SerialSettings {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_millis(10),
        }
    }
}
/// Serial-port backed stream. Reads only what the driver already holds.
pub struct SerialStream {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}
impl SerialStream {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }
    pub fn port_name(&self) -> &str {
        &self.settings.port_name
    }
    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, StreamError> {
        self.port.as_mut().ok_or(StreamError::NotOpen)
    }
}
impl ByteStream for SerialStream {
    fn open(&mut self) -> Result<(), StreamError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(self.settings.timeout)
            .open()
            .map_err(|e| StreamError::Open {
                target: self.settings.port_name.clone(),
                reason: e.to_string(),
            })?;
        info!(
            "serial port {} opened at {} baud",
            self.settings.port_name, self.settings.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }
    fn close(&mut self) {
        let Some(port) = self.port.take() else {
            return;
        };
        if let Err(e) = port.clear(ClearBuffer::All) {
            warn!("could not clear {} before closing: {e}", self.settings.port_name);
        }
        drop(port);
        info!("serial port {} closed", self.settings.port_name);
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let port = self.port_mut()?;
        let available = port.bytes_to_read()? as usize;
        let want = available.min(buf.len());
        if want == 0 {
            return Ok(0);
        }
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
    fn is_open(&self) -> bool {
        self.port.is_some()
    }
    fn flush_input(&mut self) -> Result<(), StreamError> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }
    fn flush_output(&mut self) -> Result<(), StreamError> {
        self.port_mut()?.clear(ClearBuffer::Output)?;
        Ok(())
    }
}
impl Drop for SerialStream {
    fn drop(&mut self) {
        self.close();
    }
}
