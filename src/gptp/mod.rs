//! gPTP end station: grandmaster selection, peer delay, clock servo.
//!
//! The engine owns no clock and no link. Every entry point borrows the
//! [`Clock`] it disciplines and the [`FrameTransport`] it answers on, so the
//! single scheduler loop that owns both stays the only writer.

pub mod bmca;
pub mod pdelay;
pub mod servo;

use anyhow::Result;
use log::{debug, info, trace};

use crate::clock::{Clock, HardwareClock};
use crate::config::GptpConfig;
use crate::frame::{Frame, RxFrame, TimestampId, ETH_TYPE_PTPV2, PTP_PEER_MAC};
use crate::ptp::{
    control, flags, AnnounceMessage, ClockIdentity, ClockQuality, MessageType,
    PdelayReqMessage, PdelayRespMessage, PortIdentity, PtpHeader, PtpMessage, PtpTimestamp,
    TimestampMessage,
};
use crate::stats::StatSnapshot;
use crate::traits::FrameTransport;
use bmca::{Bmca, GrandmasterRecord, MasterState};
use pdelay::{PeerDelay, ResponseOutcome};
use servo::{Servo, SyncState};

const CURRENT_UTC_OFFSET: i16 = 37;
const CLOCK_CLASS_DEFAULT: u8 = 248;
const CLOCK_ACCURACY_UNKNOWN: u8 = 0xFE;
const TIME_SOURCE_INTERNAL_OSCILLATOR: u8 = 0xA0;
const LOG_SYNC_INTERVAL: i8 = -3;
const LOG_INTERVAL_UNSPECIFIED: i8 = 127;

/// Index of each accumulator in [`GptpEngine::statistics`].
pub const STAT_OFFSET: usize = 0;
pub const STAT_FREQUENCY: usize = 1;
pub const STAT_LINK_DELAY: usize = 2;

pub struct GptpEngine {
    mac: [u8; 6],
    port_identity: PortIdentity,
    domain_number: u8,
    priority1: u8,
    priority2: u8,
    bmca: Bmca,
    peer_delay: PeerDelay,
    servo: Servo,
    /// Two-step Sync waiting for its Follow_Up.
    pending_sync: Option<SyncState>,
    announce_sequence_id: u16,
}

impl GptpEngine {
    pub fn new(config: &GptpConfig, decay_timeout_ticks: u64) -> Self {
        let port_identity = PortIdentity {
            clock_identity: ClockIdentity::from_mac(config.mac),
            port_number: config.port_number,
        };
        info!(
            "gPTP port {} (priority {} {})",
            port_identity, config.priority1, config.priority2
        );
        GptpEngine {
            mac: config.mac,
            port_identity,
            domain_number: config.domain_number,
            priority1: config.priority1,
            priority2: config.priority2,
            bmca: Bmca::new(port_identity, config.priority1, config.priority2, decay_timeout_ticks),
            peer_delay: PeerDelay::new(port_identity),
            servo: Servo::new(),
            pending_sync: None,
            announce_sequence_id: 0,
        }
    }

    pub fn port_identity(&self) -> &PortIdentity {
        &self.port_identity
    }

    pub fn state(&self) -> MasterState {
        self.bmca.state()
    }

    pub fn grandmaster(&self) -> &GrandmasterRecord {
        self.bmca.grandmaster()
    }

    pub fn link_delay_ns(&self) -> i64 {
        self.peer_delay.link_delay_ns()
    }

    /// Offset, frequency error and link delay, in that order.
    pub fn statistics(&self) -> [StatSnapshot; 3] {
        let mut out = [StatSnapshot::default(); 3];
        out[STAT_OFFSET] = self.servo.offset_stats().snapshot();
        out[STAT_FREQUENCY] = self.servo.freq_stats().snapshot();
        out[STAT_LINK_DELAY] = self.peer_delay.stats().snapshot();
        out
    }

    pub fn reset_statistics(&mut self) {
        self.servo.reset_stats();
        self.peer_delay.reset_stats();
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Process one received PTP frame. Malformed frames and messages that do
    /// not concern this port are dropped; only transmit failures are errors.
    pub fn handle_frame<H, T>(
        &mut self,
        clock: &mut Clock<H>,
        frame: &RxFrame,
        transport: &mut T,
    ) -> Result<()>
    where
        H: HardwareClock,
        T: FrameTransport,
    {
        let msg = match PtpMessage::parse(frame.payload()) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping PTP frame: {}", e);
                return Ok(());
            }
        };
        let header = msg.header();
        if header.source_port_identity == self.port_identity {
            return Ok(());
        }
        if header.domain_number != self.domain_number {
            trace!("Ignoring domain {} message", header.domain_number);
            return Ok(());
        }

        let rx_ticks = frame.hw_timestamp;
        match msg {
            PtpMessage::Announce(announce) => {
                if self.bmca.on_announce(&announce, rx_ticks) {
                    self.pending_sync = None;
                }
            }
            PtpMessage::Sync(sync) => self.on_sync(clock, &sync, rx_ticks),
            PtpMessage::FollowUp(follow_up) => self.on_follow_up(clock, &follow_up, rx_ticks),
            PtpMessage::PdelayReq(req) => self.respond_pdelay(clock, &req, rx_ticks, transport)?,
            PtpMessage::PdelayResp(resp) => {
                let t1 = clock.tx_timestamp(TimestampId::Request);
                let t1_ticks = clock.tx_ticks(TimestampId::Request);
                let t4 = clock.rx_timestamp(rx_ticks);
                if let Some(ResponseOutcome::AwaitingFollowUp { t2 }) =
                    self.peer_delay.on_response(&resp, t1, t4)
                {
                    self.servo.syntonize(clock, t1_ticks, t2);
                }
            }
            PtpMessage::PdelayRespFollowUp(fup) => {
                self.peer_delay.on_response_follow_up(&fup);
            }
            PtpMessage::Other(header) => {
                trace!("Ignoring {:?}", header.message_type);
            }
        }
        Ok(())
    }

    fn on_sync<H: HardwareClock>(&mut self, clock: &mut Clock<H>, sync: &TimestampMessage, rx_ticks: u64) {
        if !self.bmca.is_current_master(&sync.header.source_port_identity) {
            return;
        }
        self.bmca.refresh(rx_ticks);

        let state = SyncState {
            master_sequence_id: sync.header.sequence_id,
            sync_rx_ns: clock.rx_timestamp(rx_ticks),
            sync_tx_ns: sync.timestamp.to_nanos(),
            sync_correction_ns: sync.header.correction_ns(),
        };
        if sync.header.is_two_step() {
            self.pending_sync = Some(state);
        } else {
            self.pending_sync = None;
            self.servo.correct_offset(clock, &state, self.peer_delay.link_delay_ns());
        }
    }

    fn on_follow_up<H: HardwareClock>(
        &mut self,
        clock: &mut Clock<H>,
        follow_up: &TimestampMessage,
        rx_ticks: u64,
    ) {
        if !self.bmca.is_current_master(&follow_up.header.source_port_identity) {
            return;
        }
        let Some(mut state) = self.pending_sync else {
            return;
        };
        if state.master_sequence_id != follow_up.header.sequence_id {
            debug!(
                "Follow_Up seq {} does not match Sync seq {}",
                follow_up.header.sequence_id, state.master_sequence_id
            );
            return;
        }
        self.bmca.refresh(rx_ticks);
        self.pending_sync = None;

        state.sync_tx_ns = follow_up.timestamp.to_nanos();
        state.sync_correction_ns += follow_up.header.correction_ns();
        self.servo.correct_offset(clock, &state, self.peer_delay.link_delay_ns());
    }

    /// Two-step responder: Pdelay_Resp with the request's receipt time, then a
    /// follow-up carrying the response's own TX time.
    fn respond_pdelay<H, T>(
        &mut self,
        clock: &mut Clock<H>,
        req: &PdelayReqMessage,
        rx_ticks: u64,
        transport: &mut T,
    ) -> Result<()>
    where
        H: HardwareClock,
        T: FrameTransport,
    {
        let mut header = PtpHeader::new(MessageType::PdelayResp, self.port_identity, req.header.sequence_id);
        header.transport_specific = req.header.transport_specific;
        header.domain_number = req.header.domain_number;
        header.flags = flags::TWO_STEP;
        header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;

        let resp = PdelayRespMessage {
            header,
            timestamp: PtpTimestamp::from_nanos(clock.rx_timestamp(rx_ticks)),
            requesting_port_identity: req.header.source_port_identity,
        };
        transport.transmit(self.frame(&resp.to_bytes()).with_timestamp(TimestampId::Response))?;
        let t3 = clock.tx_timestamp(TimestampId::Response);

        let mut fup_header = header;
        fup_header.message_type = MessageType::PdelayRespFollowUp;
        fup_header.flags = 0;
        let fup = PdelayRespMessage {
            header: fup_header,
            timestamp: PtpTimestamp::from_nanos(t3),
            requesting_port_identity: req.header.source_port_identity,
        };
        transport.transmit(self.frame(&fup.to_bytes()))?;
        trace!("Answered Pdelay_Req seq {} from {}", req.header.sequence_id, req.header.source_port_identity);
        Ok(())
    }

    // ========================================================================
    // Periodic
    // ========================================================================

    /// Run once per housekeeping interval: expire a silent grandmaster, send
    /// Announce/Sync/Follow_Up while acting as grandmaster, and always start a
    /// new peer-delay exchange.
    pub fn housekeeping<H, T>(&mut self, clock: &mut Clock<H>, transport: &mut T) -> Result<()>
    where
        H: HardwareClock,
        T: FrameTransport,
    {
        self.bmca.check_decay(clock.ticks());

        if self.bmca.state() == MasterState::NoMaster {
            self.send_announce(transport)?;
            self.send_sync(clock, transport)?;
        }
        self.send_pdelay_req(transport)
    }

    fn header(&self, message_type: MessageType, sequence_id: u16) -> PtpHeader {
        let mut header = PtpHeader::new(message_type, self.port_identity, sequence_id);
        header.domain_number = self.domain_number;
        header
    }

    fn frame(&self, payload: &[u8]) -> Frame {
        Frame::ethernet(PTP_PEER_MAC, self.mac, ETH_TYPE_PTPV2, payload)
    }

    fn send_announce<T: FrameTransport>(&mut self, transport: &mut T) -> Result<()> {
        self.announce_sequence_id = self.announce_sequence_id.wrapping_add(1);
        let mut header = self.header(MessageType::Announce, self.announce_sequence_id);
        header.flags = flags::TIMESCALE;

        let announce = AnnounceMessage {
            header,
            origin_timestamp: PtpTimestamp::default(),
            current_utc_offset: CURRENT_UTC_OFFSET,
            grandmaster_priority1: self.priority1,
            grandmaster_clock_quality: ClockQuality {
                clock_class: CLOCK_CLASS_DEFAULT,
                clock_accuracy: CLOCK_ACCURACY_UNKNOWN,
                offset_scaled_log_variance: 0xFFFF,
            },
            grandmaster_priority2: self.priority2,
            grandmaster_identity: self.port_identity.clock_identity,
            steps_removed: 0,
            time_source: TIME_SOURCE_INTERNAL_OSCILLATOR,
        };
        transport.transmit(self.frame(&announce.to_bytes()))?;
        self.bmca.note_own_announce(self.announce_sequence_id);
        Ok(())
    }

    fn send_sync<H, T>(&mut self, clock: &Clock<H>, transport: &mut T) -> Result<()>
    where
        H: HardwareClock,
        T: FrameTransport,
    {
        let mut header = self.header(MessageType::Sync, self.announce_sequence_id);
        header.flags = flags::TWO_STEP;
        header.control = control::SYNC;
        header.log_message_interval = LOG_SYNC_INTERVAL;
        let sync = TimestampMessage {
            header,
            timestamp: PtpTimestamp::default(),
        };
        transport.transmit(self.frame(&sync.to_bytes()).with_timestamp(TimestampId::Response))?;
        let sync_tx = clock.tx_timestamp(TimestampId::Response);

        let mut header = self.header(MessageType::FollowUp, self.announce_sequence_id);
        header.control = control::FOLLOW_UP;
        header.log_message_interval = LOG_SYNC_INTERVAL;
        let follow_up = TimestampMessage {
            header,
            timestamp: PtpTimestamp::from_nanos(sync_tx),
        };
        transport.transmit(self.frame(&follow_up.to_bytes()))
    }

    fn send_pdelay_req<T: FrameTransport>(&mut self, transport: &mut T) -> Result<()> {
        let seq = self.peer_delay.begin_request();
        let mut header = self.header(MessageType::PdelayReq, seq);
        header.minor_version = 0;
        let req = PdelayReqMessage {
            header,
            origin_timestamp: PtpTimestamp::default(),
        };
        transport.transmit(self.frame(&req.to_bytes()).with_timestamp(TimestampId::Request))
    }
}
