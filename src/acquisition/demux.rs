//! Splits the raw byte stream into multi-channel frames.
//!
//! The device sends one little-endian `u16` per channel, channels
//! interleaved. Nothing on the wire marks frame starts, so alignment is a
//! property of the byte count alone: partial samples and partial frames
//! are kept across calls and never thrown away.
use std::collections::VecDeque;
use log::warn;
use crate::acquisition::ConfigurationError;
/// Upper bound on channels; per-frame state lives in fixed arrays.
pub const MAX_CHANNELS: usize = 8;
/// Feeds without a completed frame before a stall is reported.
const STALL_REPORT_FEEDS: usize = 64;
/// One synchronized reading per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    raw: [u16; MAX_CHANNELS],
    len: usize,
}
impl Frame {
    pub fn from_raw(raw: &[u16]) -> Self {
        let mut frame = Self::empty();
        for &value in raw.iter().take(MAX_CHANNELS) {
            frame.raw[frame.len] = value;
            frame.len += 1;
        }
        frame
    }
    fn empty() -> Self {
        Self {
            raw: [0; MAX_CHANNELS],
            len: 0,
        }
    }
    pub fn raw(&self) -> &[u16] {
        &self.raw[..self.len]
    }
    pub fn channel_count(&self) -> usize {
        self.len
    }
}
pub struct ChannelDemux {
    channel_count: usize,
    partial: Frame,
    // Undecoded input; a single byte once a feed has been fully drained.
    carry: VecDeque<u8>,
    idle_feeds: usize,
    stall_reported: bool,
}
impl ChannelDemux {
    pub fn new(channel_count: usize) -> Result<Self, ConfigurationError> {
        if channel_count == 0 {
            return Err(ConfigurationError::ZeroChannels);
        }
        if channel_count > MAX_CHANNELS {
            return Err(ConfigurationError::TooManyChannels {
                requested: channel_count,
                max: MAX_CHANNELS,
            });
        }
        Ok(Self {
            channel_count,
            partial: Frame::empty(),
            carry: VecDeque::with_capacity(2),
            idle_feeds: 0,
            stall_reported: false,
        })
    }
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
    /// Samples accumulated toward the next frame.
    pub fn pending_samples(&self) -> usize {
        self.partial.len
    }
    /// Bytes held back because they do not yet form a whole sample.
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
    /// Drops all partial state, e.g. after the stream was reopened.
    pub fn reset(&mut self) {
        self.partial = Frame::empty();
        self.carry.clear();
        self.idle_feeds = 0;
        self.stall_reported = false;
    }
    /// Lazily yields every frame completed by `bytes`.
    ///
    /// The iterator may be dropped early; whatever it has not consumed is
    /// kept for the next call, so frame boundaries never depend on how the
    /// stream happened to chunk its reads.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            demux: self,
            bytes,
            pos: 0,
            emitted: 0,
        }
    }
    fn next_sample(&mut self, bytes: &[u8], pos: &mut usize) -> Option<u16> {
        let lo = match self.carry.pop_front() {
            Some(byte) => byte,
            None => {
                let byte = *bytes.get(*pos)?;
                *pos += 1;
                byte
            }
        };
        let hi = match self.carry.pop_front() {
            Some(byte) => byte,
            None => match bytes.get(*pos) {
                Some(&byte) => {
                    *pos += 1;
                    byte
                }
                None => {
                    self.carry.push_front(lo);
                    return None;
                }
            },
        };
        Some(u16::from_le_bytes([lo, hi]))
    }
    fn note_feed_finished(&mut self, emitted: usize) {
        if emitted > 0 || self.partial.len == 0 {
            self.idle_feeds = 0;
            self.stall_reported = false;
            return;
        }
        self.idle_feeds += 1;
        if self.idle_feeds >= STALL_REPORT_FEEDS && !self.stall_reported {
            self.stall_reported = true;
            warn!(
                "framing stalled: {} of {} samples pending across {} reads",
                self.partial.len, self.channel_count, self.idle_feeds
            );
        }
    }
}
pub struct Frames<'a> {
    demux: &'a mut ChannelDemux,
    bytes: &'a [u8],
    pos: usize,
    emitted: usize,
}
impl Iterator for Frames<'_> {
    type Item = Frame;
    fn next(&mut self) -> Option<Frame> {
        loop {
            let sample = self.demux.next_sample(self.bytes, &mut self.pos)?;
            let partial = &mut self.demux.partial;
            partial.raw[partial.len] = sample;
            partial.len += 1;
            if partial.len == self.demux.channel_count {
                let frame = std::mem::replace(partial, Frame::empty());
                self.emitted += 1;
                return Some(frame);
            }
        }
    }
}
impl Drop for Frames<'_> {
    fn drop(&mut self) {
        // Unread input waits for the next feed.
        self.demux.carry.extend(&self.bytes[self.pos..]);
        self.demux.note_feed_finished(self.emitted);
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    fn encode(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
    #[test]
    fn full_frame_yields_exactly_one() {
        for n in 1..=MAX_CHANNELS {
            let mut demux = ChannelDemux::new(n).unwrap();
            let samples: Vec<u16> = (0..n as u16).collect();
            let frames: Vec<Frame> = demux.feed(&encode(&samples)).collect();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].raw(), samples.as_slice());
        }
    }
    #[test]
    fn one_byte_short_yields_nothing_and_keeps_the_byte() {
        for n in 1..=MAX_CHANNELS {
            let mut demux = ChannelDemux::new(n).unwrap();
            let samples: Vec<u16> = (100..100 + n as u16).collect();
            let bytes = encode(&samples);
            let (head, last) = bytes.split_at(bytes.len() - 1);
            assert_eq!(demux.feed(head).count(), 0);
            assert_eq!(demux.pending_bytes(), 1);
            assert_eq!(demux.pending_samples(), n - 1);
            let frames: Vec<Frame> = demux.feed(last).collect();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].raw(), samples.as_slice());
        }
    }
    #[test]
    fn empty_feed_yields_nothing() {
        let mut demux = ChannelDemux::new(2).unwrap();
        assert_eq!(demux.feed(&[]).count(), 0);
        assert_eq!(demux.pending_bytes(), 0);
    }
    #[test]
    fn chunking_does_not_change_frames() {
        let mut rng = StdRng::seed_from_u64(0x5c0_9e);
        for channels in [1usize, 2, 3, 5, 8] {
            let samples: Vec<u16> = (0..channels * 97).map(|_| rng.gen_range(0..4096)).collect();
            let mut bytes = encode(&samples);
            bytes.push(0x42); // dangling half sample
            let mut whole = ChannelDemux::new(channels).unwrap();
            let expected: Vec<Frame> = whole.feed(&bytes).collect();
            assert_eq!(expected.len(), 97);
            for _ in 0..20 {
                let mut chunked = ChannelDemux::new(channels).unwrap();
                let mut got = Vec::new();
                let mut rest = bytes.as_slice();
                while !rest.is_empty() {
                    let take = rng.gen_range(0..=rest.len().min(9));
                    let (chunk, tail) = rest.split_at(take);
                    got.extend(chunked.feed(chunk));
                    rest = tail;
                }
                assert_eq!(got, expected);
                assert_eq!(chunked.pending_bytes(), 1);
            }
        }
    }
    #[test]
    fn dropping_iterator_early_preserves_alignment() {
        let mut demux = ChannelDemux::new(2).unwrap();
        let bytes = encode(&[1, 2, 3, 4, 5]);
        let first = demux.feed(&bytes).next().unwrap();
        assert_eq!(first.raw(), &[1, 2]);
        assert_eq!(demux.pending_samples(), 0);
        assert_eq!(demux.pending_bytes(), 6);
        let frames: Vec<Frame> = demux.feed(&encode(&[6])).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].raw(), &[3, 4]);
        assert_eq!(frames[1].raw(), &[5, 6]);
    }
    #[test]
    fn rejects_bad_channel_counts() {
        assert!(matches!(
            ChannelDemux::new(0),
            Err(ConfigurationError::ZeroChannels)
        ));
        assert!(matches!(
            ChannelDemux::new(MAX_CHANNELS + 1),
            Err(ConfigurationError::TooManyChannels { .. })
        ));
    }
    #[test]
    fn little_endian_decoding() {
        let mut demux = ChannelDemux::new(2).unwrap();
        let frames: Vec<Frame> = demux.feed(&[0x00, 0x00, 0xFF, 0x0F]).collect();
        assert_eq!(frames[0].raw(), &[0, 4095]);
    }
}
