//! PTPv2 / gPTP (IEEE 1588-2008, IEEE 802.1AS) message encoding.
//!
//! Everything on the wire is big-endian. Nibble-packed fields
//! (`transportSpecific|messageType`, `minorVersionPTP|versionPTP`) are packed by
//! hand, timestamps are 48-bit seconds + 32-bit nanoseconds and correction
//! fields are signed nanoseconds scaled by 2^16.

use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use thiserror::Error;

pub const TRANSPORT_SPECIFIC_GPTP: u8 = 0x1;
pub const PTP_VERSION: u8 = 2;
pub const PTP_MINOR_VERSION: u8 = 1;

/// Header flag bits, as the 16-bit big-endian `flags` field.
pub mod flags {
    pub const LI_61: u16 = 1 << 0;
    pub const LI_59: u16 = 1 << 1;
    pub const UTC_REASONABLE: u16 = 1 << 2;
    pub const TIMESCALE: u16 = 1 << 3;
    pub const TIME_TRACEABLE: u16 = 1 << 4;
    pub const FREQUENCY_TRACEABLE: u16 = 1 << 5;
    pub const SYNCHRONIZATION_UNCERTAIN: u16 = 1 << 6;
    pub const ALTERNATE_MASTER: u16 = 1 << 8;
    pub const TWO_STEP: u16 = 1 << 9;
    pub const UNICAST: u16 = 1 << 10;
    pub const PROFILE_SPECIFIC_1: u16 = 1 << 13;
    pub const PROFILE_SPECIFIC_2: u16 = 1 << 14;
    pub const SECURITY: u16 = 1 << 15;
}

/// Legacy `controlField` values.
pub mod control {
    pub const SYNC: u8 = 0x0;
    pub const DELAY_REQ: u8 = 0x1;
    pub const FOLLOW_UP: u8 = 0x2;
    pub const DELAY_RESP: u8 = 0x3;
    pub const MANAGEMENT: u8 = 0x4;
    pub const ALL_OTHER: u8 = 0x5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer too short: need {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
    #[error("unknown PTP message type {0:#x}")]
    UnknownMessageType(u8),
    #[error("timestamp {seconds}s {nanoseconds}ns does not fit in u64 nanoseconds")]
    TimestampOutOfRange { seconds: u64, nanoseconds: u32 },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), WireError> {
    if buf.len() < expected {
        return Err(WireError::BufferTooShort {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Sync = 0x0,
    DelayReq = 0x1,
    PdelayReq = 0x2,
    PdelayResp = 0x3,
    FollowUp = 0x8,
    DelayResp = 0x9,
    PdelayRespFollowUp = 0xA,
    Announce = 0xB,
    Signaling = 0xC,
    Management = 0xD,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value & 0x0f {
            0x0 => MessageType::Sync,
            0x1 => MessageType::DelayReq,
            0x2 => MessageType::PdelayReq,
            0x3 => MessageType::PdelayResp,
            0x8 => MessageType::FollowUp,
            0x9 => MessageType::DelayResp,
            0xA => MessageType::PdelayRespFollowUp,
            0xB => MessageType::Announce,
            0xC => MessageType::Signaling,
            0xD => MessageType::Management,
            other => return Err(WireError::UnknownMessageType(other)),
        })
    }
}

/// EUI-64 clock identity. Ordering is the raw byte-wise ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    pub const SIZE: usize = 8;

    /// Expand a MAC address: `mac[0..3] ff ff mac[3..6]`.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        ClockIdentity([mac[0], mac[1], mac[2], 0xff, 0xff, mac[3], mac[4], mac[5]])
    }

    fn read(buf: &[u8]) -> Self {
        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[..8]);
        ClockIdentity(id)
    }
}

impl fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortIdentity {
    pub clock_identity: ClockIdentity,
    pub port_number: u16,
}

impl PortIdentity {
    pub const SIZE: usize = 10;

    fn read(buf: &[u8]) -> Self {
        PortIdentity {
            clock_identity: ClockIdentity::read(&buf[0..8]),
            port_number: BigEndian::read_u16(&buf[8..10]),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.clock_identity.0);
        BigEndian::write_u16(&mut buf[8..10], self.port_number);
    }
}

impl fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.clock_identity, self.port_number)
    }
}

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// 48-bit seconds + 32-bit nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtpTimestamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    pub const SIZE: usize = 10;

    pub fn from_nanos(ns: u64) -> Self {
        PtpTimestamp {
            seconds: ns / NANOS_PER_SECOND,
            nanoseconds: (ns % NANOS_PER_SECOND) as u32,
        }
    }

    /// None when the value is not a valid u64 nanosecond count (nanoseconds
    /// field >= 1e9, or seconds past ~584 years).
    pub fn checked_nanos(&self) -> Option<u64> {
        if self.nanoseconds >= NANOS_PER_SECOND as u32 {
            return None;
        }
        self.seconds
            .checked_mul(NANOS_PER_SECOND)?
            .checked_add(self.nanoseconds as u64)
    }

    /// Saturates for timestamps that `checked_nanos` rejects. Parsed messages
    /// never carry those.
    pub fn to_nanos(&self) -> u64 {
        self.seconds
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(self.nanoseconds as u64)
    }

    fn read(buf: &[u8]) -> Self {
        PtpTimestamp {
            seconds: BigEndian::read_u48(&buf[0..6]),
            nanoseconds: BigEndian::read_u32(&buf[6..10]),
        }
    }

    /// Read and reject values that have no nanosecond representation.
    fn read_checked(buf: &[u8]) -> Result<Self, WireError> {
        let ts = Self::read(buf);
        match ts.checked_nanos() {
            Some(_) => Ok(ts),
            None => Err(WireError::TimestampOutOfRange {
                seconds: ts.seconds,
                nanoseconds: ts.nanoseconds,
            }),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        BigEndian::write_u48(&mut buf[0..6], self.seconds & 0xffff_ffff_ffff);
        BigEndian::write_u32(&mut buf[6..10], self.nanoseconds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockQuality {
    pub clock_class: u8,
    pub clock_accuracy: u8,
    pub offset_scaled_log_variance: u16,
}

impl ClockQuality {
    fn read(buf: &[u8]) -> Self {
        ClockQuality {
            clock_class: buf[0],
            clock_accuracy: buf[1],
            offset_scaled_log_variance: BigEndian::read_u16(&buf[2..4]),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0] = self.clock_class;
        buf[1] = self.clock_accuracy;
        BigEndian::write_u16(&mut buf[2..4], self.offset_scaled_log_variance);
    }
}

/// Common 34-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpHeader {
    pub transport_specific: u8,
    pub message_type: MessageType,
    pub minor_version: u8,
    pub version: u8,
    pub message_length: u16,
    pub domain_number: u8,
    pub minor_sdo_id: u8,
    pub flags: u16,
    /// Nanoseconds * 2^16
    pub correction_field: i64,
    pub message_type_specific: u32,
    pub source_port_identity: PortIdentity,
    pub sequence_id: u16,
    pub control: u8,
    pub log_message_interval: i8,
}

impl PtpHeader {
    pub const SIZE: usize = 34;

    /// gPTP header with zeroed correction and flags.
    pub fn new(message_type: MessageType, source_port_identity: PortIdentity, sequence_id: u16) -> Self {
        PtpHeader {
            transport_specific: TRANSPORT_SPECIFIC_GPTP,
            message_type,
            minor_version: PTP_MINOR_VERSION,
            version: PTP_VERSION,
            message_length: 0,
            domain_number: 0,
            minor_sdo_id: 0,
            flags: 0,
            correction_field: 0,
            message_type_specific: 0,
            source_port_identity,
            sequence_id,
            control: control::ALL_OTHER,
            log_message_interval: 0,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::SIZE)?;
        Ok(PtpHeader {
            transport_specific: buf[0] >> 4,
            message_type: MessageType::try_from(buf[0] & 0x0f)?,
            minor_version: buf[1] >> 4,
            version: buf[1] & 0x0f,
            message_length: BigEndian::read_u16(&buf[2..4]),
            domain_number: buf[4],
            minor_sdo_id: buf[5],
            flags: BigEndian::read_u16(&buf[6..8]),
            correction_field: BigEndian::read_i64(&buf[8..16]),
            message_type_specific: BigEndian::read_u32(&buf[16..20]),
            source_port_identity: PortIdentity::read(&buf[20..30]),
            sequence_id: BigEndian::read_u16(&buf[30..32]),
            control: buf[32],
            log_message_interval: buf[33] as i8,
        })
    }

    fn write(&self, buf: &mut [u8], message_length: usize) {
        buf[0] = (self.transport_specific << 4) | (self.message_type as u8 & 0x0f);
        buf[1] = (self.minor_version << 4) | (self.version & 0x0f);
        BigEndian::write_u16(&mut buf[2..4], message_length as u16);
        buf[4] = self.domain_number;
        buf[5] = self.minor_sdo_id;
        BigEndian::write_u16(&mut buf[6..8], self.flags);
        BigEndian::write_i64(&mut buf[8..16], self.correction_field);
        BigEndian::write_u32(&mut buf[16..20], self.message_type_specific);
        self.source_port_identity.write(&mut buf[20..30]);
        BigEndian::write_u16(&mut buf[30..32], self.sequence_id);
        buf[32] = self.control;
        buf[33] = self.log_message_interval as u8;
    }

    pub fn is_two_step(&self) -> bool {
        self.flags & flags::TWO_STEP != 0
    }

    /// Correction field in whole nanoseconds (sub-ns fraction dropped).
    pub fn correction_ns(&self) -> i64 {
        self.correction_field >> 16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceMessage {
    pub header: PtpHeader,
    pub origin_timestamp: PtpTimestamp,
    pub current_utc_offset: i16,
    pub grandmaster_priority1: u8,
    pub grandmaster_clock_quality: ClockQuality,
    pub grandmaster_priority2: u8,
    pub grandmaster_identity: ClockIdentity,
    pub steps_removed: u16,
    pub time_source: u8,
}

impl AnnounceMessage {
    pub const SIZE: usize = 64;

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = PtpHeader::parse(buf)?;
        check_len(buf, Self::SIZE)?;
        Ok(AnnounceMessage {
            header,
            origin_timestamp: PtpTimestamp::read_checked(&buf[34..44])?,
            current_utc_offset: BigEndian::read_i16(&buf[44..46]),
            grandmaster_priority1: buf[47],
            grandmaster_clock_quality: ClockQuality::read(&buf[48..52]),
            grandmaster_priority2: buf[52],
            grandmaster_identity: ClockIdentity::read(&buf[53..61]),
            steps_removed: BigEndian::read_u16(&buf[61..63]),
            time_source: buf[63],
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.header.write(&mut buf, Self::SIZE);
        self.origin_timestamp.write(&mut buf[34..44]);
        BigEndian::write_i16(&mut buf[44..46], self.current_utc_offset);
        buf[47] = self.grandmaster_priority1;
        self.grandmaster_clock_quality.write(&mut buf[48..52]);
        buf[52] = self.grandmaster_priority2;
        buf[53..61].copy_from_slice(&self.grandmaster_identity.0);
        BigEndian::write_u16(&mut buf[61..63], self.steps_removed);
        buf[63] = self.time_source;
        buf
    }
}

/// Sync and Follow_Up share one layout: header + one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampMessage {
    pub header: PtpHeader,
    pub timestamp: PtpTimestamp,
}

impl TimestampMessage {
    pub const SIZE: usize = 44;

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = PtpHeader::parse(buf)?;
        check_len(buf, Self::SIZE)?;
        Ok(TimestampMessage {
            header,
            timestamp: PtpTimestamp::read_checked(&buf[34..44])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.header.write(&mut buf, Self::SIZE);
        self.timestamp.write(&mut buf[34..44]);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdelayReqMessage {
    pub header: PtpHeader,
    pub origin_timestamp: PtpTimestamp,
}

impl PdelayReqMessage {
    // 10 reserved bytes pad the request to the response size
    pub const SIZE: usize = 54;

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = PtpHeader::parse(buf)?;
        check_len(buf, Self::SIZE)?;
        Ok(PdelayReqMessage {
            header,
            origin_timestamp: PtpTimestamp::read_checked(&buf[34..44])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.header.write(&mut buf, Self::SIZE);
        self.origin_timestamp.write(&mut buf[34..44]);
        buf
    }
}

/// Pdelay_Resp (`requestReceiptTimestamp`) and Pdelay_Resp_Follow_Up
/// (`responseOriginTimestamp`) share one layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdelayRespMessage {
    pub header: PtpHeader,
    pub timestamp: PtpTimestamp,
    pub requesting_port_identity: PortIdentity,
}

impl PdelayRespMessage {
    pub const SIZE: usize = 54;

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = PtpHeader::parse(buf)?;
        check_len(buf, Self::SIZE)?;
        Ok(PdelayRespMessage {
            header,
            timestamp: PtpTimestamp::read_checked(&buf[34..44])?,
            requesting_port_identity: PortIdentity::read(&buf[44..54]),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.header.write(&mut buf, Self::SIZE);
        self.timestamp.write(&mut buf[34..44]);
        self.requesting_port_identity.write(&mut buf[44..54]);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtpMessage {
    Announce(AnnounceMessage),
    Sync(TimestampMessage),
    FollowUp(TimestampMessage),
    PdelayReq(PdelayReqMessage),
    PdelayResp(PdelayRespMessage),
    PdelayRespFollowUp(PdelayRespMessage),
    /// End-to-end delay, signaling and management messages: not handled.
    Other(PtpHeader),
}

impl PtpMessage {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = PtpHeader::parse(buf)?;
        Ok(match header.message_type {
            MessageType::Announce => PtpMessage::Announce(AnnounceMessage::parse(buf)?),
            MessageType::Sync => PtpMessage::Sync(TimestampMessage::parse(buf)?),
            MessageType::FollowUp => PtpMessage::FollowUp(TimestampMessage::parse(buf)?),
            MessageType::PdelayReq => PtpMessage::PdelayReq(PdelayReqMessage::parse(buf)?),
            MessageType::PdelayResp => PtpMessage::PdelayResp(PdelayRespMessage::parse(buf)?),
            MessageType::PdelayRespFollowUp => {
                PtpMessage::PdelayRespFollowUp(PdelayRespMessage::parse(buf)?)
            }
            _ => PtpMessage::Other(header),
        })
    }

    pub fn header(&self) -> &PtpHeader {
        match self {
            PtpMessage::Announce(m) => &m.header,
            PtpMessage::Sync(m) | PtpMessage::FollowUp(m) => &m.header,
            PtpMessage::PdelayReq(m) => &m.header,
            PtpMessage::PdelayResp(m) | PtpMessage::PdelayRespFollowUp(m) => &m.header,
            PtpMessage::Other(h) => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(last: u8) -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([0x00, 0x11, 0x22, 0xff, 0xff, 0x33, 0x44, last]),
            port_number: 1,
        }
    }

    fn sample_announce() -> AnnounceMessage {
        let mut header = PtpHeader::new(MessageType::Announce, port(0x55), 0xBEEF);
        header.flags = flags::TIMESCALE;
        AnnounceMessage {
            header,
            origin_timestamp: PtpTimestamp::default(),
            current_utc_offset: 37,
            grandmaster_priority1: 246,
            grandmaster_clock_quality: ClockQuality {
                clock_class: 248,
                clock_accuracy: 0xFE,
                offset_scaled_log_variance: 0xFFFF,
            },
            grandmaster_priority2: 247,
            grandmaster_identity: port(0x55).clock_identity,
            steps_removed: 0,
            time_source: 0xA0,
        }
    }

    #[test]
    fn test_announce_roundtrip_preserves_bmca_fields() {
        let announce = sample_announce();
        let bytes = announce.to_bytes();
        assert_eq!(bytes.len(), AnnounceMessage::SIZE);

        let parsed = AnnounceMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.grandmaster_priority1, 246);
        assert_eq!(parsed.grandmaster_priority2, 247);
        assert_eq!(parsed.header.sequence_id, 0xBEEF);
        assert_eq!(parsed.header.source_port_identity, port(0x55));
        assert_eq!(parsed.header.message_length, 64);
        assert_eq!(parsed.grandmaster_identity, announce.grandmaster_identity);
    }

    #[test]
    fn test_announce_byte_layout() {
        let bytes = sample_announce().to_bytes();
        // transportSpecific=1 | messageType=0xB
        assert_eq!(bytes[0], 0x1B);
        // minorVersionPTP=1 | versionPTP=2
        assert_eq!(bytes[1], 0x12);
        assert_eq!(&bytes[2..4], &[0x00, 0x40]);
        // PTP_TIMESCALE lives in the second flag octet
        assert_eq!(&bytes[6..8], &[0x00, 0x08]);
        assert_eq!(&bytes[20..28], &[0x00, 0x11, 0x22, 0xff, 0xff, 0x33, 0x44, 0x55]);
        assert_eq!(&bytes[28..30], &[0x00, 0x01]);
        assert_eq!(&bytes[30..32], &[0xBE, 0xEF]);
        assert_eq!(bytes[32], control::ALL_OTHER);
        assert_eq!(&bytes[44..46], &[0x00, 37]);
        assert_eq!(bytes[47], 246);
        assert_eq!(&bytes[48..52], &[248, 0xFE, 0xFF, 0xFF]);
        assert_eq!(bytes[52], 247);
        assert_eq!(bytes[63], 0xA0);
    }

    #[test]
    fn test_two_step_flag_position() {
        let mut header = PtpHeader::new(MessageType::Sync, port(1), 7);
        header.flags = flags::TWO_STEP;
        header.log_message_interval = -3;
        let bytes = TimestampMessage { header, timestamp: PtpTimestamp::default() }.to_bytes();
        assert_eq!(bytes[6], 0x02);
        assert_eq!(bytes[7], 0x00);
        assert_eq!(bytes[33], 0xFD);

        let parsed = PtpHeader::parse(&bytes).unwrap();
        assert!(parsed.is_two_step());
        assert_eq!(parsed.log_message_interval, -3);
    }

    #[test]
    fn test_timestamp_48bit_seconds() {
        let ts = PtpTimestamp {
            seconds: 0x1234_5678_9ABC,
            nanoseconds: 999_999_999,
        };
        let mut buf = [0u8; 10];
        ts.write(&mut buf);
        assert_eq!(&buf[0..6], &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(PtpTimestamp::read(&buf), ts);

        let ns = 12_000_000_345u64;
        let ts = PtpTimestamp::from_nanos(ns);
        assert_eq!(ts.seconds, 12);
        assert_eq!(ts.nanoseconds, 345);
        assert_eq!(ts.to_nanos(), ns);
    }

    #[test]
    fn test_timestamp_beyond_u64_nanos_is_rejected() {
        let ts = PtpTimestamp {
            seconds: 0xFFFF_FFFF_FFFF,
            nanoseconds: 0,
        };
        assert_eq!(ts.checked_nanos(), None);
        assert_eq!(ts.to_nanos(), u64::MAX);

        let mut header = PtpHeader::new(MessageType::Sync, port(1), 3);
        header.flags = flags::TWO_STEP;
        let bytes = TimestampMessage { header, timestamp: ts }.to_bytes();
        assert_eq!(
            PtpMessage::parse(&bytes),
            Err(WireError::TimestampOutOfRange { seconds: 0xFFFF_FFFF_FFFF, nanoseconds: 0 })
        );

        // Largest whole second that still fits
        let edge = PtpTimestamp {
            seconds: u64::MAX / NANOS_PER_SECOND,
            nanoseconds: 0,
        };
        assert!(edge.checked_nanos().is_some());
        let bad_ns = PtpTimestamp {
            seconds: 1,
            nanoseconds: 1_000_000_000,
        };
        assert_eq!(bad_ns.checked_nanos(), None);
    }

    #[test]
    fn test_correction_field_scaling() {
        let mut header = PtpHeader::new(MessageType::PdelayResp, port(2), 1);
        header.correction_field = (1500 << 16) | 0x8000;
        assert_eq!(header.correction_ns(), 1500);

        let msg = PdelayRespMessage {
            header,
            timestamp: PtpTimestamp::from_nanos(1050),
            requesting_port_identity: port(9),
        };
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0x05, 0xDC, 0x80, 0x00]);
        assert_eq!(PdelayRespMessage::parse(&bytes).unwrap(), PdelayRespMessage {
            header: PtpHeader { message_length: 54, ..header },
            ..msg
        });
    }

    #[test]
    fn test_dispatch_by_message_type() {
        let req = PdelayReqMessage {
            header: PtpHeader::new(MessageType::PdelayReq, port(3), 42),
            origin_timestamp: PtpTimestamp::default(),
        };
        match PtpMessage::parse(&req.to_bytes()).unwrap() {
            PtpMessage::PdelayReq(m) => assert_eq!(m.header.sequence_id, 42),
            other => panic!("unexpected {:?}", other),
        }

        let mut bytes = req.to_bytes();
        bytes[0] = 0x19; // Delay_Resp
        assert!(matches!(PtpMessage::parse(&bytes).unwrap(), PtpMessage::Other(_)));
    }

    #[test]
    fn test_short_and_unknown_buffers() {
        assert_eq!(
            PtpHeader::parse(&[0u8; 20]),
            Err(WireError::BufferTooShort { expected: 34, actual: 20 })
        );

        let bytes = sample_announce().to_bytes();
        assert_eq!(
            AnnounceMessage::parse(&bytes[..50]),
            Err(WireError::BufferTooShort { expected: 64, actual: 50 })
        );

        let mut bytes = bytes;
        bytes[0] = 0x14;
        assert_eq!(PtpMessage::parse(&bytes), Err(WireError::UnknownMessageType(0x4)));
    }

    #[test]
    fn test_clock_identity_from_mac_and_display() {
        let id = ClockIdentity::from_mac([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(id.0, [0x00, 0x11, 0x22, 0xff, 0xff, 0x33, 0x44, 0x55]);
        assert_eq!(id.to_string(), "00:11:22:ff:ff:33:44:55");
        assert!(ClockIdentity([0, 0, 0, 0, 0, 0, 0, 2]) > ClockIdentity([0, 0, 0, 0, 0, 0, 0, 1]));
    }
}
