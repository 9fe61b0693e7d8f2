//! Two-state grandmaster selection.
//!
//! A node is its own grandmaster until it hears an Announce that beats its
//! current record, and falls back to itself when the grandmaster goes quiet
//! for longer than the decay timeout.

use log::info;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::ptp::{AnnounceMessage, PortIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterState {
    /// This node is the grandmaster.
    NoMaster,
    /// Slaved to a remote grandmaster.
    HasMaster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrandmasterRecord {
    pub port_identity: PortIdentity,
    pub priority1: u8,
    pub priority2: u8,
    pub sequence_id: u16,
    /// Raw counter value of the last Announce/Sync from this grandmaster.
    pub last_sync_ticks: u64,
}

impl GrandmasterRecord {
    pub fn from_announce(announce: &AnnounceMessage, rx_ticks: u64) -> Self {
        GrandmasterRecord {
            port_identity: announce.header.source_port_identity,
            priority1: announce.grandmaster_priority1,
            priority2: announce.grandmaster_priority2,
            sequence_id: announce.header.sequence_id,
            last_sync_ticks: rx_ticks,
        }
    }
}

/// Eligibility order. `Greater` means `a` is the better grandmaster.
///
/// Lower priority1, then lower priority2, then the later announcement
/// (higher sequence id), then the larger clock identity. The port number
/// breaks what is left so distinct ports never compare equal.
pub fn compare_records(a: &GrandmasterRecord, b: &GrandmasterRecord) -> Ordering {
    b.priority1
        .cmp(&a.priority1)
        .then(b.priority2.cmp(&a.priority2))
        .then(a.sequence_id.cmp(&b.sequence_id))
        .then(a.port_identity.clock_identity.cmp(&b.port_identity.clock_identity))
        .then(a.port_identity.port_number.cmp(&b.port_identity.port_number))
}

/// True if `candidate` should replace `current`. A candidate carrying the
/// current grandmaster's own port identity never does.
pub fn is_better_master(candidate: &GrandmasterRecord, current: &GrandmasterRecord) -> bool {
    if candidate.port_identity == current.port_identity {
        return false;
    }
    compare_records(candidate, current) == Ordering::Greater
}

#[derive(Debug, Clone)]
pub struct Bmca {
    state: MasterState,
    local: GrandmasterRecord,
    current: GrandmasterRecord,
    decay_timeout_ticks: u64,
}

impl Bmca {
    pub fn new(local: PortIdentity, priority1: u8, priority2: u8, decay_timeout_ticks: u64) -> Self {
        let local = GrandmasterRecord {
            port_identity: local,
            priority1,
            priority2,
            sequence_id: 0,
            last_sync_ticks: 0,
        };
        Bmca {
            state: MasterState::NoMaster,
            local,
            current: local,
            decay_timeout_ticks,
        }
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn grandmaster(&self) -> &GrandmasterRecord {
        &self.current
    }

    pub fn is_current_master(&self, port: &PortIdentity) -> bool {
        self.state == MasterState::HasMaster && self.current.port_identity == *port
    }

    pub fn is_decayed(&self, now_ticks: u64) -> bool {
        now_ticks.saturating_sub(self.current.last_sync_ticks) > self.decay_timeout_ticks
    }

    /// Fall back to the self record if the grandmaster has gone quiet.
    /// Returns true on the HasMaster -> NoMaster transition.
    pub fn check_decay(&mut self, now_ticks: u64) -> bool {
        if self.state != MasterState::HasMaster || !self.is_decayed(now_ticks) {
            return false;
        }
        info!(
            "Grandmaster {} timed out, acting as grandmaster",
            self.current.port_identity
        );
        self.state = MasterState::NoMaster;
        self.current = self.local;
        true
    }

    /// Evaluate an Announce. Returns true if it made the sender the new
    /// grandmaster.
    pub fn on_announce(&mut self, announce: &AnnounceMessage, rx_ticks: u64) -> bool {
        self.check_decay(rx_ticks);

        let candidate = GrandmasterRecord::from_announce(announce, rx_ticks);
        if self.is_current_master(&candidate.port_identity) {
            self.current.sequence_id = candidate.sequence_id;
            self.current.last_sync_ticks = rx_ticks;
            return false;
        }
        if !is_better_master(&candidate, &self.current) {
            return false;
        }

        info!(
            "New grandmaster {} (priority {} {})",
            candidate.port_identity, candidate.priority1, candidate.priority2
        );
        self.state = MasterState::HasMaster;
        self.current = candidate;
        true
    }

    /// A Sync/Follow_Up from the grandmaster keeps it alive.
    pub fn refresh(&mut self, rx_ticks: u64) {
        self.current.last_sync_ticks = rx_ticks;
    }

    /// Record the sequence id of an Announce this node sent itself.
    pub fn note_own_announce(&mut self, sequence_id: u16) {
        self.local.sequence_id = sequence_id;
        if self.state == MasterState::NoMaster {
            self.current.sequence_id = sequence_id;
        }
    }
}
