use crate::frame::Frame;

pub const TX_RING_CAPACITY: usize = 40;

/// Fixed-capacity FIFO of owned frames.
///
/// Slots are addressed by index; a frame is moved in on `push` and moved out
/// on `pop`, so the ring is the sole owner while it is queued.
#[derive(Debug)]
pub struct TxRing {
    slots: Vec<Option<Frame>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Default for TxRing {
    fn default() -> Self {
        Self::new()
    }
}

impl TxRing {
    pub fn new() -> Self {
        TxRing {
            slots: (0..TX_RING_CAPACITY).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == TX_RING_CAPACITY
    }

    /// Append at the tail. A full ring hands the frame back.
    pub fn push(&mut self, frame: Frame) -> Result<(), Frame> {
        if self.is_full() {
            return Err(frame);
        }
        self.slots[self.tail] = Some(frame);
        self.tail = (self.tail + 1) % TX_RING_CAPACITY;
        self.count += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        if self.is_empty() {
            return None;
        }
        let frame = self.slots[self.head].take();
        self.head = (self.head + 1) % TX_RING_CAPACITY;
        self.count -= 1;
        frame
    }

    pub fn peek(&self) -> Option<&Frame> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref()
    }
}
