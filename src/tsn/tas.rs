//! Time-Aware Shaper gate schedule (802.1Qbv style).

use serde::{Deserialize, Serialize};

use super::TSN_QUEUE_COUNT;

pub const MAX_TAS_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEntry {
    /// Bit i set = queue i open
    pub gate_bitmask: u8,
    pub duration_ns: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasSchedule {
    pub enabled: bool,
    pub entries: Vec<GateEntry>,
    /// 0 = derive from the entry durations
    pub cycle_time_ns: u64,
    /// Not used for alignment; cycles are counted from counter zero.
    pub base_time_ns: u64,
}

impl Default for TasSchedule {
    fn default() -> Self {
        TasSchedule {
            enabled: false,
            entries: Vec::new(),
            cycle_time_ns: 0,
            base_time_ns: 0,
        }
    }
}

impl TasSchedule {
    pub fn entries_duration_ns(&self) -> u64 {
        self.entries.iter().map(|e| e.duration_ns as u64).sum()
    }

    pub fn effective_cycle_ns(&self) -> u64 {
        if self.cycle_time_ns == 0 {
            self.entries_duration_ns()
        } else {
            self.cycle_time_ns
        }
    }

    /// Entry active at `now_ns`, if the entries cover that point of the cycle.
    pub fn active_entry(&self, now_ns: u64) -> Option<&GateEntry> {
        let cycle = self.effective_cycle_ns();
        if cycle == 0 {
            return None;
        }
        let mut remaining = now_ns % cycle;
        for entry in &self.entries {
            let duration = entry.duration_ns as u64;
            if remaining < duration {
                return Some(entry);
            }
            remaining -= duration;
        }
        None
    }

    pub fn gate_status(&self, now_ns: u64) -> [bool; TSN_QUEUE_COUNT] {
        if !self.enabled {
            return [true; TSN_QUEUE_COUNT];
        }
        let mask = self.active_entry(now_ns).map_or(0, |e| e.gate_bitmask);
        std::array::from_fn(|q| mask & (1 << q) != 0)
    }
}
