use crate::acquisition::ConfigurationError;
/// Fixed-capacity circular store of the most recent samples of one channel.
///
/// Always full: it starts zero-filled and every push overwrites the oldest
/// slot. The backing store is never reallocated.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    slots: Box<[f64]>,
    cursor: usize, // next slot to overwrite == oldest sample
}
impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        if capacity == 0 {
            return Err(ConfigurationError::ZeroRingCapacity);
        }
        Ok(Self {
            slots: vec![0.0; capacity].into_boxed_slice(),
            cursor: 0,
        })
    }
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
    pub fn push(&mut self, value: f64) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
    }
    pub fn latest(&self) -> f64 {
        let idx = (self.cursor + self.slots.len() - 1) % self.slots.len();
        self.slots[idx]
    }
    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer.iter()).copied()
    }
    pub fn snapshot(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.capacity());
        self.snapshot_into(&mut out);
        out
    }
    /// Like [`snapshot`](Self::snapshot) but reuses the caller's storage.
    pub fn snapshot_into(&self, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.iter());
    }
    pub fn max(&self) -> f64 {
        self.slots.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}
/// Display history of one channel; same ring semantics as [`RingBuffer`]
/// but sized for the screen and independent of the analysis ring.
#[derive(Clone, Debug)]
pub struct TraceBuffer {
    ring: RingBuffer,
    revision: u64,
}
impl TraceBuffer {
    pub fn new(length: usize) -> Result<Self, ConfigurationError> {
        let ring = RingBuffer::new(length).map_err(|_| ConfigurationError::ZeroTraceLength)?;
        Ok(Self { ring, revision: 0 })
    }
    pub fn len(&self) -> usize {
        self.ring.capacity()
    }
    /// Shifts the newest value in at the right edge.
    pub fn shift_in(&mut self, value: f64) {
        self.ring.push(value);
        self.revision += 1;
    }
    /// Bumped on every update, so readers can skip unchanged traces.
    pub fn revision(&self) -> u64 {
        self.revision
    }
    /// Left-to-right plotting order.
    pub fn snapshot(&self) -> Vec<f64> {
        self.ring.snapshot()
    }
    pub fn snapshot_into(&self, out: &mut Vec<f64>) {
        self.ring.snapshot_into(out)
    }
}
