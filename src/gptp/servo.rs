use log::{debug, trace};

use super::pdelay::SyntonizeHistory;
use crate::clock::{Clock, HardwareClock};
use crate::stats::StatAccumulator;

/// Ratios outside (1 - BOUND, 1 + BOUND) come from corrupt exchanges.
const SYNTONIZE_RATIO_BOUND: f64 = 0.1;

/// Sync / Follow_Up pair from the grandmaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub master_sequence_id: u16,
    pub sync_rx_ns: u64,
    pub sync_tx_ns: u64,
    pub sync_correction_ns: i64,
}

impl SyncState {
    /// Local minus master time at Sync reception, link delay removed.
    pub fn offset_ns(&self, link_delay_ns: i64) -> i64 {
        let transit = self
            .sync_rx_ns
            .wrapping_sub(self.sync_tx_ns.wrapping_add(self.sync_correction_ns as u64));
        transit as i64 - link_delay_ns
    }
}

/// Phase correction plus syntonization. Steps the offset of the clock model
/// and rewrites its slope; there is no PI loop.
#[derive(Debug, Clone, Default)]
pub struct Servo {
    history: SyntonizeHistory,
    offset_stats: StatAccumulator,
    freq_stats: StatAccumulator,
}

impl Servo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock onto the grandmaster's time. Returns the applied delta.
    pub fn correct_offset<H: HardwareClock>(
        &mut self,
        clock: &mut Clock<H>,
        sync: &SyncState,
        link_delay_ns: i64,
    ) -> i64 {
        let delta = sync.offset_ns(link_delay_ns);
        clock.apply_offset_correction(delta);
        self.offset_stats.add(delta as f64);
        debug!(
            "Servo: seq={} delta={}ns link_delay={}ns",
            sync.master_sequence_id, delta, link_delay_ns
        );
        delta
    }

    /// Feed one (local tick, remote ns) pair and retune the clock rate once
    /// the history is full. Returns the ratio applied, if any.
    pub fn syntonize<H: HardwareClock>(
        &mut self,
        clock: &mut Clock<H>,
        local_ticks: u64,
        remote_ns: u64,
    ) -> Option<f64> {
        self.history.push(local_ticks, remote_ns);
        let ratio = self.history.ratio(clock.tick_scale_ns())?;

        if ratio <= 1.0 - SYNTONIZE_RATIO_BOUND || ratio >= 1.0 + SYNTONIZE_RATIO_BOUND {
            debug!("Servo: discarding neighbor ratio {:.6}", ratio);
            return None;
        }
        trace!("Servo: neighbor ratio {:.9}", ratio);
        clock.adjust_slope(ratio);
        self.freq_stats.add((1.0 - ratio) * 1e9);
        Some(ratio)
    }

    pub fn offset_stats(&self) -> &StatAccumulator {
        &self.offset_stats
    }

    pub fn freq_stats(&self) -> &StatAccumulator {
        &self.freq_stats
    }

    pub fn reset_stats(&mut self) {
        self.offset_stats.reset();
        self.freq_stats.reset();
    }
}
