use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use log::{debug, info};
use crate::acquisition::StreamError;
/// Duplex byte source feeding the scope (serial link, socket, playback).
///
/// `read` must never block: it returns whatever is available right now,
/// which may be nothing.
pub trait ByteStream: Send {
    fn open(&mut self) -> Result<(), StreamError>;
    /// Releases the underlying handle. Calling it again is a no-op.
    fn close(&mut self);
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;
    fn is_open(&self) -> bool;
    fn flush_input(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
    fn flush_output(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}
impl ByteStream for Box<dyn ByteStream> {
    fn open(&mut self) -> Result<(), StreamError> {
        (**self).open()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        (**self).read(buf)
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn flush_input(&mut self) -> Result<(), StreamError> {
        (**self).flush_input()
    }
    fn flush_output(&mut self) -> Result<(), StreamError> {
        (**self).flush_output()
    }
}
/// Drains a [`ByteStream`] into a read buffer allocated once up front.
pub struct StreamReader<S: ByteStream> {
    stream: S,
    buf: Vec<u8>,
}
impl<S: ByteStream> StreamReader<S> {
    pub fn new(stream: S, max_read_bytes: usize) -> Self {
        Self {
            stream,
            buf: vec![0; max_read_bytes.max(1)],
        }
    }
    pub fn stream(&self) -> &S {
        &self.stream
    }
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
    pub fn open(&mut self) -> Result<(), StreamError> {
        self.stream.open()
    }
    pub fn close(&mut self) {
        self.stream.close()
    }
    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }
    /// Reads whatever the stream has available, up to the buffer size.
    pub fn drain(&mut self) -> Result<&[u8], StreamError> {
        let n = self.stream.read(&mut self.buf)?;
        Ok(&self.buf[..n])
    }
}
/// In-memory stream useful for tests and deterministic playback.
///
/// Each queued chunk is delivered by at most one `read` call, so tests
/// control exactly where the read boundaries fall.
#[derive(Debug, Default)]
pub struct ManualStream {
    chunks: VecDeque<Vec<u8>>,
    open: bool,
    fail_next_read: bool,
    close_count: usize,
}
impl ManualStream {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            ..Self::default()
        }
    }
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) {
        self.chunks.push_back(chunk.into());
    }
    /// Makes the next `read` report an unexpected close.
    pub fn fail_next_read(&mut self) {
        self.fail_next_read = true;
    }
    /// How many times an open handle was actually released.
    pub fn close_count(&self) -> usize {
        self.close_count
    }
    pub fn pending_chunks(&self) -> usize {
        self.chunks.len()
    }
}
impl ByteStream for ManualStream {
    fn open(&mut self) -> Result<(), StreamError> {
        self.open = true;
        Ok(())
    }
    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.close_count += 1;
        }
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.open {
            return Err(StreamError::NotOpen);
        }
        if std::mem::take(&mut self.fail_next_read) {
            return Err(StreamError::Closed);
        }
        let Some(chunk) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n == chunk.len() {
            self.chunks.pop_front();
        } else {
            chunk.drain(..n);
        }
        Ok(n)
    }
    fn is_open(&self) -> bool {
        self.open
    }
    fn flush_input(&mut self) -> Result<(), StreamError> {
        self.chunks.clear();
        Ok(())
    }
}
/// TCP client stream in non-blocking mode.
pub struct SocketStream {
    address: String,
    socket: Option<TcpStream>,
}
impl SocketStream {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            socket: None,
        }
    }
    pub fn address(&self) -> &str {
        &self.address
    }
}
impl ByteStream for SocketStream {
    fn open(&mut self) -> Result<(), StreamError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let open_err = |e: std::io::Error| StreamError::Open {
            target: self.address.clone(),
            reason: e.to_string(),
        };
        let socket = TcpStream::connect(&self.address).map_err(open_err)?;
        socket.set_nonblocking(true).map_err(open_err)?;
        info!("socket {} connected", self.address);
        self.socket = Some(socket);
        Ok(())
    }
    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(std::net::Shutdown::Both);
            info!("socket {} closed", self.address);
        }
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let socket = self.socket.as_mut().ok_or(StreamError::NotOpen)?;
        match socket.read(buf) {
            Ok(0) if !buf.is_empty() => Err(StreamError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
    fn flush_input(&mut self) -> Result<(), StreamError> {
        let mut scratch = [0u8; 256];
        let mut dropped = 0usize;
        loop {
            match self.read(&mut scratch)? {
                0 => break,
                n => dropped += n,
            }
        }
        debug!("discarded {dropped} pending socket bytes");
        Ok(())
    }
}
impl Drop for SocketStream {
    fn drop(&mut self) {
        self.close();
    }
}
