use serde::{Deserialize, Serialize};

use crate::gptp::bmca::MasterState;
use crate::stats::StatSnapshot;
use crate::tsn::{QueueCounters, TSN_QUEUE_COUNT};

/// Scheduler status shared with readers outside the loop thread
/// (status file writer, tests).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SchedulerStatus {
    // ========================================================================
    // gPTP
    // ========================================================================
    pub master_state: MasterState,

    /// Port identity of the current grandmaster, ours while in NoMaster
    pub grandmaster: String,
    pub grandmaster_priority1: u8,
    pub grandmaster_priority2: u8,

    /// Last completed peer-delay measurement (nanoseconds)
    pub link_delay_ns: i64,

    /// Servo telemetry. `num == 0` means no samples yet.
    pub offset: StatSnapshot,
    pub frequency: StatSnapshot,
    pub link_delay: StatSnapshot,

    // ========================================================================
    // TSN
    // ========================================================================
    pub tas_enabled: bool,
    pub queue_depths: [usize; TSN_QUEUE_COUNT],
    pub queue_counters: [QueueCounters; TSN_QUEUE_COUNT],

    /// Corrected clock reading at the last update
    pub updated_ns: u64,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        SchedulerStatus {
            master_state: MasterState::NoMaster,
            grandmaster: String::new(),
            grandmaster_priority1: 0,
            grandmaster_priority2: 0,
            link_delay_ns: 0,
            offset: StatSnapshot::default(),
            frequency: StatSnapshot::default(),
            link_delay: StatSnapshot::default(),
            tas_enabled: false,
            queue_depths: [0; TSN_QUEUE_COUNT],
            queue_counters: [QueueCounters::default(); TSN_QUEUE_COUNT],
            updated_ns: 0,
        }
    }
}
