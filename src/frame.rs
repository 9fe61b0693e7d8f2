//! Owned frame buffers exchanged with the MAC layer.
//!
//! A [`Frame`] is moved into a transmit ring on enqueue and moved out again on
//! dequeue; dropping it returns the buffer to the allocator.

/// Ethernet II header length (no VLAN tag).
pub const ETH_HEADER_LEN: usize = 14;
pub const ETH_TYPE_PTPV2: u16 = 0x88F7;

/// Link-local peer-delay multicast, never forwarded by bridges.
pub const PTP_PEER_MAC: [u8; 6] = [0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e];

/// Hardware TX timestamp capture slot.
///
/// The MAC latches the counter into the given register when a frame carrying
/// this id leaves the wire; it is read back with `HardwareClock::tx_timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimestampId {
    /// Sync and Pdelay_Resp
    Response = 1,
    /// Pdelay_Req
    Request = 2,
}

impl TimestampId {
    pub const REGISTER_COUNT: usize = 4;

    pub fn register_index(self) -> usize {
        self as usize - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    timestamp_id: Option<TimestampId>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Frame {
            data,
            timestamp_id: None,
        }
    }

    /// Build an untagged Ethernet II frame around `payload`.
    pub fn ethernet(dst: [u8; 6], src: [u8; 6], ethertype: u16, payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
        data.extend_from_slice(&dst);
        data.extend_from_slice(&src);
        data.extend_from_slice(&ethertype.to_be_bytes());
        data.extend_from_slice(payload);
        Frame::new(data)
    }

    pub fn with_timestamp(mut self, id: TimestampId) -> Self {
        self.timestamp_id = Some(id);
        self
    }

    pub fn timestamp_id(&self) -> Option<TimestampId> {
        self.timestamp_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size on the wire in bits, as charged against a shaper.
    pub fn bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// A received frame together with the raw hardware counter value latched at
/// reception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub data: Vec<u8>,
    pub hw_timestamp: u64,
}

impl RxFrame {
    pub fn new(data: Vec<u8>, hw_timestamp: u64) -> Self {
        RxFrame { data, hw_timestamp }
    }

    pub fn ethertype(&self) -> Option<u16> {
        if self.data.len() < ETH_HEADER_LEN {
            return None;
        }
        Some(u16::from_be_bytes([self.data[12], self.data[13]]))
    }

    pub fn payload(&self) -> &[u8] {
        self.data.get(ETH_HEADER_LEN..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_framing() {
        let src = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        let frame = Frame::ethernet(PTP_PEER_MAC, src, ETH_TYPE_PTPV2, &[0xAA, 0xBB]);
        assert_eq!(frame.len(), 16);
        assert_eq!(frame.bits(), 128);
        assert_eq!(&frame.data()[0..6], &PTP_PEER_MAC);
        assert_eq!(&frame.data()[6..12], &src);
        assert_eq!(&frame.data()[12..14], &[0x88, 0xF7]);

        let rx = RxFrame::new(frame.into_data(), 42);
        assert_eq!(rx.ethertype(), Some(ETH_TYPE_PTPV2));
        assert_eq!(rx.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_runt_frame_has_no_ethertype() {
        let rx = RxFrame::new(vec![0u8; 10], 0);
        assert_eq!(rx.ethertype(), None);
        assert!(rx.payload().is_empty());
    }

    #[test]
    fn test_timestamp_register_index() {
        assert_eq!(TimestampId::Response.register_index(), 0);
        assert_eq!(TimestampId::Request.register_index(), 1);
        let frame = Frame::new(vec![1, 2, 3]).with_timestamp(TimestampId::Request);
        assert_eq!(frame.timestamp_id(), Some(TimestampId::Request));
    }
}
