//! Peer-delay measurement (Pdelay_Req / Pdelay_Resp / Pdelay_Resp_Follow_Up).
//!
//! ```text
//!   requester            responder
//!   t1  ---- Pdelay_Req ---->  t2
//!   t4  <--- Pdelay_Resp ----  t3
//!       <--- Resp_Follow_Up --  (t3)
//! ```

use log::{debug, trace};

use crate::ptp::{PdelayRespMessage, PortIdentity};
use crate::stats::StatAccumulator;

pub const SYNTONIZE_HISTORY_LEN: usize = 10;

/// `((t2 - t1) + (t4 - (t3 + c1 + c2))) / 2`
pub fn link_delay(t1: u64, t2: u64, t3: u64, t4: u64, c1: i64, c2: i64) -> i64 {
    let outbound = t2.wrapping_sub(t1) as i64;
    let inbound = t4.wrapping_sub(t3) as i64 - c1 - c2;
    (outbound + inbound) / 2
}

/// One-step responders fold their turnaround time into the correction.
pub fn one_step_link_delay(t1: u64, t4: u64, c1: i64) -> i64 {
    (t4.wrapping_sub(t1) as i64 - c1) / 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PdelayResponse {
    t2: u64,
    t4: u64,
    c1: i64,
}

/// One outstanding request. Replaced when the next request goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdelayExchange {
    pub sequence_id: u16,
    pub t1: u64,
    response: Option<PdelayResponse>,
}

/// What a valid Pdelay_Resp produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseOutcome {
    /// Two-step: waiting for the follow-up. Carries `t2` for syntonization.
    AwaitingFollowUp { t2: u64 },
    /// One-step: measurement done.
    Complete { link_delay: i64 },
}

/// Requester side of the peer-delay state, plus the link delay statistics.
#[derive(Debug, Clone)]
pub struct PeerDelay {
    local: PortIdentity,
    next_sequence_id: u16,
    last_sequence_id: Option<u16>,
    pending: Option<PdelayExchange>,
    link_delay_ns: i64,
    stats: StatAccumulator,
}

impl PeerDelay {
    pub fn new(local: PortIdentity) -> Self {
        PeerDelay {
            local,
            next_sequence_id: 0,
            last_sequence_id: None,
            pending: None,
            link_delay_ns: 0,
            stats: StatAccumulator::new(),
        }
    }

    /// Last completed measurement, 0 before the first.
    pub fn link_delay_ns(&self) -> i64 {
        self.link_delay_ns
    }

    pub fn stats(&self) -> &StatAccumulator {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn pending(&self) -> Option<&PdelayExchange> {
        self.pending.as_ref()
    }

    /// Allocate the sequence id for the next Pdelay_Req. Any exchange still
    /// outstanding is abandoned.
    pub fn begin_request(&mut self) -> u16 {
        let seq = self.next_sequence_id;
        self.next_sequence_id = self.next_sequence_id.wrapping_add(1);
        self.last_sequence_id = Some(seq);
        self.pending = None;
        seq
    }

    fn accept(&mut self, msg: &PdelayRespMessage, what: &str) -> bool {
        let ok = msg.requesting_port_identity == self.local
            && self.last_sequence_id == Some(msg.header.sequence_id);
        if !ok {
            debug!(
                "Dropping {} seq {} for {} (expected seq {:?} for {})",
                what,
                msg.header.sequence_id,
                msg.requesting_port_identity,
                self.last_sequence_id,
                self.local
            );
            self.pending = None;
        }
        ok
    }

    /// Handle a Pdelay_Resp. `t1` is the corrected TX time of our request,
    /// `t4` the corrected RX time of this response.
    pub fn on_response(&mut self, msg: &PdelayRespMessage, t1: u64, t4: u64) -> Option<ResponseOutcome> {
        if !self.accept(msg, "Pdelay_Resp") {
            return None;
        }
        let c1 = msg.header.correction_ns();

        if !msg.header.is_two_step() {
            let delay = one_step_link_delay(t1, t4, c1);
            self.complete(delay);
            return Some(ResponseOutcome::Complete { link_delay: delay });
        }

        let t2 = msg.timestamp.to_nanos();
        self.pending = Some(PdelayExchange {
            sequence_id: msg.header.sequence_id,
            t1,
            response: Some(PdelayResponse { t2, t4, c1 }),
        });
        Some(ResponseOutcome::AwaitingFollowUp { t2 })
    }

    /// Handle a Pdelay_Resp_Follow_Up and return the new link delay.
    pub fn on_response_follow_up(&mut self, msg: &PdelayRespMessage) -> Option<i64> {
        if !self.accept(msg, "Pdelay_Resp_Follow_Up") {
            return None;
        }
        let exchange = self.pending.take()?;
        let resp = exchange.response?;
        let t3 = msg.timestamp.to_nanos();
        let c2 = msg.header.correction_ns();

        trace!(
            "pdelay t1={} t2={} t3={} t4={} c1={} c2={}",
            exchange.t1, resp.t2, t3, resp.t4, resp.c1, c2
        );
        let delay = link_delay(exchange.t1, resp.t2, t3, resp.t4, resp.c1, c2);
        self.complete(delay);
        Some(delay)
    }

    fn complete(&mut self, delay: i64) {
        trace!("Link delay {} ns", delay);
        self.pending = None;
        self.link_delay_ns = delay;
        self.stats.add(delay as f64);
    }
}

/// Last `SYNTONIZE_HISTORY_LEN` pairs of (local counter at Pdelay_Req TX,
/// remote ns at Pdelay_Req RX).
#[derive(Debug, Clone, Default)]
pub struct SyntonizeHistory {
    entries: [(u64, u64); SYNTONIZE_HISTORY_LEN],
    next: usize,
    filled: usize,
}

impl SyntonizeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, local_ticks: u64, remote_ns: u64) {
        self.entries[self.next] = (local_ticks, remote_ns);
        self.next = (self.next + 1) % SYNTONIZE_HISTORY_LEN;
        self.filled = (self.filled + 1).min(SYNTONIZE_HISTORY_LEN);
    }

    pub fn is_full(&self) -> bool {
        self.filled == SYNTONIZE_HISTORY_LEN
    }

    /// Remote ns per local tick between the oldest and newest sample, divided
    /// by `tick_scale_ns`: 1.0 when the two clocks run at the same rate.
    /// None until the history is full or if the counter did not advance.
    pub fn ratio(&self, tick_scale_ns: u32) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let (oldest_ticks, oldest_ns) = self.entries[self.next];
        let newest = (self.next + SYNTONIZE_HISTORY_LEN - 1) % SYNTONIZE_HISTORY_LEN;
        let (newest_ticks, newest_ns) = self.entries[newest];

        let dticks = newest_ticks.wrapping_sub(oldest_ticks);
        if dticks == 0 {
            return None;
        }
        let dns = newest_ns.wrapping_sub(oldest_ns);
        Some(dns as f64 / dticks as f64 / tick_scale_ns as f64)
    }
}
