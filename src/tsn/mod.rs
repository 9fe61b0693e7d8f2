//! Eight-queue transmit scheduler: TAS gates, CBS credit, WRR fallback.

pub mod cbs;
pub mod ring;
pub mod tas;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::TsnConfig;
use crate::frame::Frame;
use cbs::CbsConfig;
use ring::TxRing;
use tas::{TasSchedule, MAX_TAS_ENTRIES};

pub const TSN_QUEUE_COUNT: usize = 8;
/// Best-effort queue, serviced only when nothing else is eligible.
pub const BEST_EFFORT_QUEUE: usize = 0;
/// Highest WRR queue; the cursor starts here.
const WRR_TOP_QUEUE: usize = TSN_QUEUE_COUNT - 1;

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("transmit queue {queue} is full")]
    QueueFull { queue: usize, frame: Frame },
    #[error("no transmit queue {queue}")]
    InvalidQueue { queue: usize, frame: Frame },
}

impl EnqueueError {
    /// Take back the frame that could not be queued.
    pub fn into_frame(self) -> Frame {
        match self {
            EnqueueError::QueueFull { frame, .. } | EnqueueError::InvalidQueue { frame, .. } => frame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("gate schedule has {0} entries, at most {max} supported", max = MAX_TAS_ENTRIES)]
    TooManyEntries(usize),
    #[error("no transmit queue {0}")]
    InvalidQueue(usize),
    #[error("hi_credit {hi} is below lo_credit {lo}")]
    InvalidCreditBounds { hi: i16, lo: i16 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub enqueued: u64,
    pub dropped: u64,
    pub transmitted: u64,
}

#[derive(Debug, Default)]
struct TxQueues {
    rings: [TxRing; TSN_QUEUE_COUNT],
    counters: [QueueCounters; TSN_QUEUE_COUNT],
}

impl TxQueues {
    fn push(&mut self, frame: Frame, queue: usize) -> Result<(), EnqueueError> {
        if queue >= TSN_QUEUE_COUNT {
            return Err(EnqueueError::InvalidQueue { queue, frame });
        }
        match self.rings[queue].push(frame) {
            Ok(()) => {
                self.counters[queue].enqueued += 1;
                Ok(())
            }
            Err(frame) => {
                self.counters[queue].dropped += 1;
                debug!("TX queue {} full, dropping {} byte frame", queue, frame.len());
                Err(EnqueueError::QueueFull { queue, frame })
            }
        }
    }
}

fn lock(queues: &Mutex<TxQueues>) -> MutexGuard<'_, TxQueues> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer side of the transmit rings. Cloneable and `Send`, so frames can be
/// queued from threads other than the scheduler loop.
#[derive(Debug, Clone)]
pub struct EnqueueHandle {
    queues: Arc<Mutex<TxQueues>>,
}

impl EnqueueHandle {
    pub fn enqueue(&self, frame: Frame, queue: usize) -> Result<(), EnqueueError> {
        lock(&self.queues).push(frame, queue)
    }
}

pub struct TsnScheduler {
    queues: Arc<Mutex<TxQueues>>,
    admin: TasSchedule,
    oper: TasSchedule,
    cbs: [CbsConfig; TSN_QUEUE_COUNT],
    link_speed_bps: u64,
    wrr_current: usize,
    wrr_count: usize,
}

impl TsnScheduler {
    pub fn new(config: &TsnConfig) -> Result<Self, ConfigError> {
        let mut scheduler = TsnScheduler {
            queues: Arc::new(Mutex::new(TxQueues::default())),
            admin: TasSchedule::default(),
            oper: TasSchedule::default(),
            cbs: [CbsConfig::default(); TSN_QUEUE_COUNT],
            link_speed_bps: config.link_speed_bps,
            wrr_current: WRR_TOP_QUEUE,
            wrr_count: 0,
        };
        scheduler.set_tas_schedule(config.tas.clone())?;
        for (queue, cbs) in config.cbs.iter().enumerate() {
            scheduler.set_cbs_config(queue, *cbs)?;
        }
        Ok(scheduler)
    }

    pub fn enqueue_handle(&self) -> EnqueueHandle {
        EnqueueHandle {
            queues: Arc::clone(&self.queues),
        }
    }

    /// Queue a frame for transmission. A full ring hands the frame back in the
    /// error.
    pub fn enqueue(&self, frame: Frame, queue: usize) -> Result<(), EnqueueError> {
        lock(&self.queues).push(frame, queue)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Install a new gate schedule. The operational copy is swapped as a whole,
    /// so arbitration never sees a half-applied schedule.
    pub fn set_tas_schedule(&mut self, mut admin: TasSchedule) -> Result<(), ConfigError> {
        if admin.entries.len() > MAX_TAS_ENTRIES {
            return Err(ConfigError::TooManyEntries(admin.entries.len()));
        }
        if admin.cycle_time_ns == 0 {
            admin.cycle_time_ns = admin.entries_duration_ns();
        }
        if admin.enabled && admin.entries_duration_ns() < admin.cycle_time_ns {
            debug!(
                "Gate schedule covers {} of {} ns; remainder has all gates closed",
                admin.entries_duration_ns(),
                admin.cycle_time_ns
            );
        }
        info!(
            "TAS schedule {}: {} entries, cycle {} ns",
            if admin.enabled { "enabled" } else { "disabled" },
            admin.entries.len(),
            admin.cycle_time_ns
        );
        self.oper = admin.clone();
        self.admin = admin;
        Ok(())
    }

    pub fn admin_schedule(&self) -> &TasSchedule {
        &self.admin
    }

    pub fn oper_schedule(&self) -> &TasSchedule {
        &self.oper
    }

    pub fn set_cbs_config(&mut self, queue: usize, config: CbsConfig) -> Result<(), ConfigError> {
        if queue >= TSN_QUEUE_COUNT {
            return Err(ConfigError::InvalidQueue(queue));
        }
        config.validate()?;
        let config = config.clamped();
        if config.enabled {
            info!(
                "CBS queue {}: idle {} send {} credit [{}, {}]",
                queue, config.idle_slope, config.send_slope, config.lo_credit, config.hi_credit
            );
        }
        self.cbs[queue] = config;
        Ok(())
    }

    pub fn cbs_config(&self, queue: usize) -> Option<&CbsConfig> {
        self.cbs.get(queue)
    }

    // ========================================================================
    // Arbitration
    // ========================================================================

    pub fn gate_status(&self, now_ns: u64) -> [bool; TSN_QUEUE_COUNT] {
        self.oper.gate_status(now_ns)
    }

    /// Credit of every queue at `now_ns`, with idle accrual applied to the
    /// enabled ones.
    pub fn credit_status(&mut self, now_ns: u64) -> [i64; TSN_QUEUE_COUNT] {
        std::array::from_fn(|q| {
            let cbs = &mut self.cbs[q];
            if cbs.enabled {
                cbs.accrue(now_ns)
            } else {
                cbs.current_credit
            }
        })
    }

    /// Pick the queue to service next, or None if nothing may be sent now.
    ///
    /// Order: gate-open CBS queues with non-negative credit (highest credit,
    /// ties to the higher queue), then WRR over queues 1..=7, then the
    /// best-effort queue unless it is shaped.
    pub fn select_queue(&mut self, now_ns: u64) -> Option<usize> {
        let gates = self.gate_status(now_ns);
        let credits = self.credit_status(now_ns);
        let pending = self.pending();

        let mut best: Option<usize> = None;
        for q in (0..TSN_QUEUE_COUNT).rev() {
            if !(gates[q] && pending[q] && self.cbs[q].enabled && credits[q] >= 0) {
                continue;
            }
            if best.map_or(true, |b| credits[q] > credits[b]) {
                best = Some(q);
            }
        }
        if best.is_some() {
            return best;
        }

        // Shaped queues in deficit still take their WRR share
        let eligible: [bool; TSN_QUEUE_COUNT] = std::array::from_fn(|q| gates[q] && pending[q]);

        if let Some(q) = self.select_wrr(&eligible) {
            return Some(q);
        }

        (eligible[BEST_EFFORT_QUEUE] && !self.cbs[BEST_EFFORT_QUEUE].enabled)
            .then_some(BEST_EFFORT_QUEUE)
    }

    fn select_wrr(&mut self, eligible: &[bool; TSN_QUEUE_COUNT]) -> Option<usize> {
        let mut q = self.wrr_current;
        for _ in 0..WRR_TOP_QUEUE {
            if eligible[q] {
                if q != self.wrr_current {
                    self.wrr_current = q;
                    self.wrr_count = 0;
                }
                self.wrr_count += 1;
                // Queue weight == queue index
                if self.wrr_count >= q {
                    self.wrr_current = wrr_next(q);
                    self.wrr_count = 0;
                }
                return Some(q);
            }
            q = wrr_next(q);
        }
        None
    }

    /// Remove the head frame of `queue`, charging it to the shaper.
    pub fn dequeue(&mut self, queue: usize) -> Option<Frame> {
        if queue >= TSN_QUEUE_COUNT {
            return None;
        }
        let frame = {
            let mut queues = lock(&self.queues);
            let frame = queues.rings[queue].pop()?;
            queues.counters[queue].transmitted += 1;
            frame
        };
        if self.cbs[queue].enabled {
            self.cbs[queue].debit(frame.bits(), self.link_speed_bps);
        }
        Some(frame)
    }

    pub fn dequeue_next(&mut self, now_ns: u64) -> Option<Frame> {
        let queue = self.select_queue(now_ns)?;
        self.dequeue(queue)
    }

    /// Copy of the head frame of `queue`.
    pub fn peek(&self, queue: usize) -> Option<Frame> {
        lock(&self.queues).rings.get(queue)?.peek().cloned()
    }

    pub fn queue_depths(&self) -> [usize; TSN_QUEUE_COUNT] {
        let queues = lock(&self.queues);
        std::array::from_fn(|q| queues.rings[q].len())
    }

    pub fn counters(&self) -> [QueueCounters; TSN_QUEUE_COUNT] {
        lock(&self.queues).counters
    }

    fn pending(&self) -> [bool; TSN_QUEUE_COUNT] {
        let queues = lock(&self.queues);
        std::array::from_fn(|q| !queues.rings[q].is_empty())
    }
}

/// WRR cursor order: 7, 6, .., 1, then back to 7.
fn wrr_next(q: usize) -> usize {
    if q <= 1 {
        WRR_TOP_QUEUE
    } else {
        q - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsn::tas::GateEntry;

    fn scheduler() -> TsnScheduler {
        TsnScheduler::new(&TsnConfig::default()).unwrap()
    }

    fn tagged(queue: usize) -> Frame {
        Frame::new(vec![queue as u8; 125])
    }

    fn fill(sched: &TsnScheduler, queue: usize, n: usize) {
        for _ in 0..n {
            sched.enqueue(tagged(queue), queue).unwrap();
        }
    }

    fn shaped(idle_slope: i16) -> CbsConfig {
        CbsConfig {
            enabled: true,
            idle_slope,
            send_slope: -90,
            hi_credit: 10,
            lo_credit: -100,
            ..CbsConfig::default()
        }
    }

    #[test]
    fn test_wrr_grants_match_weights() {
        let mut sched = scheduler();
        for q in 1..TSN_QUEUE_COUNT {
            fill(&sched, q, 20);
        }

        let mut grants = [0usize; TSN_QUEUE_COUNT];
        let mut order = Vec::new();
        for _ in 0..28 {
            let frame = sched.dequeue_next(0).unwrap();
            let q = frame.data()[0] as usize;
            grants[q] += 1;
            order.push(q);
        }
        assert_eq!(grants, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(&order[..8], &[7, 7, 7, 7, 7, 7, 7, 6]);
        assert_eq!(order[27], 1);

        // The next window starts again at queue 7
        assert_eq!(sched.select_queue(0), Some(7));
    }

    #[test]
    fn test_wrr_skips_empty_queues() {
        let mut sched = scheduler();
        fill(&sched, 3, 10);
        fill(&sched, 5, 1);

        assert_eq!(sched.dequeue_next(0).unwrap().data()[0], 5);
        for _ in 0..3 {
            assert_eq!(sched.dequeue_next(0).unwrap().data()[0], 3);
        }
        // Cursor wrapped past 1 back to 7; only queue 3 still has frames
        assert_eq!(sched.dequeue_next(0).unwrap().data()[0], 3);
    }

    #[test]
    fn test_best_effort_is_last_resort() {
        let mut sched = scheduler();
        fill(&sched, BEST_EFFORT_QUEUE, 1);
        fill(&sched, 2, 1);

        assert_eq!(sched.select_queue(0), Some(2));
        sched.dequeue(2);
        assert_eq!(sched.select_queue(0), Some(BEST_EFFORT_QUEUE));
        sched.dequeue(BEST_EFFORT_QUEUE);
        assert_eq!(sched.select_queue(0), None);
    }

    #[test]
    fn test_cbs_preempts_wrr_and_ties_go_high() {
        let mut sched = scheduler();
        sched.set_cbs_config(2, shaped(10)).unwrap();
        sched.set_cbs_config(5, shaped(10)).unwrap();
        fill(&sched, 2, 2);
        fill(&sched, 5, 2);
        fill(&sched, 7, 2);

        // Both shaped queues at zero credit
        assert_eq!(sched.select_queue(0), Some(5));
        sched.dequeue(5);
        assert!(sched.cbs_config(5).unwrap().current_credit < 0);

        assert_eq!(sched.select_queue(0), Some(2));
        sched.dequeue(2);

        // Both shaped queues in deficit: no preemption, WRR cursor is on 7
        assert_eq!(sched.select_queue(0), Some(7));

        // 1000 bits at 100 Mbit/s took 10 us, recovery takes 9x that
        assert_eq!(sched.select_queue(100_000), Some(5));
    }

    #[test]
    fn test_shaped_queue_in_deficit_falls_back_to_wrr() {
        let mut sched = scheduler();
        let mut starved = shaped(10);
        starved.current_credit = -1 << cbs::CBS_FRACTION_BITS;
        sched.set_cbs_config(3, starved).unwrap();
        fill(&sched, 3, 1);

        assert_eq!(sched.select_queue(0), Some(3));
        let frame = sched.dequeue_next(0).unwrap();
        assert_eq!(frame.data()[0], 3);
        // Still charged for the frame
        assert!(sched.cbs_config(3).unwrap().current_credit < starved.current_credit);
    }

    #[test]
    fn test_shaped_best_effort_queue_needs_credit() {
        let mut sched = scheduler();
        let mut starved = shaped(10);
        starved.current_credit = -1 << cbs::CBS_FRACTION_BITS;
        sched.set_cbs_config(BEST_EFFORT_QUEUE, starved).unwrap();
        fill(&sched, BEST_EFFORT_QUEUE, 1);

        assert_eq!(sched.select_queue(0), None);
        // 1 credit unit at idle slope 10 takes just over 0.1 s to pay back
        assert_eq!(sched.select_queue(100_000_000), None);
        assert_eq!(sched.select_queue(101_000_000), Some(BEST_EFFORT_QUEUE));
    }

    #[test]
    fn test_out_of_bounds_initial_credit_is_clamped() {
        let mut sched = scheduler();
        let mut config = shaped(10);
        config.current_credit = 500 << cbs::CBS_FRACTION_BITS;
        config.last_update_time_ns = 1_000_000;
        sched.set_cbs_config(4, config).unwrap();

        let hi = sched.cbs_config(4).unwrap().hi_bound();
        assert_eq!(sched.cbs_config(4).unwrap().current_credit, hi);
        assert_eq!(sched.credit_status(0)[4], hi);
    }

    #[test]
    fn test_highest_credit_wins() {
        let mut sched = scheduler();
        let mut rich = shaped(10);
        rich.current_credit = 5 << cbs::CBS_FRACTION_BITS;
        sched.set_cbs_config(1, rich).unwrap();
        sched.set_cbs_config(6, shaped(10)).unwrap();
        fill(&sched, 1, 1);
        fill(&sched, 6, 1);
        assert_eq!(sched.select_queue(0), Some(1));
    }

    #[test]
    fn test_closed_gate_excludes_queue() {
        let mut sched = scheduler();
        sched
            .set_tas_schedule(TasSchedule {
                enabled: true,
                entries: vec![
                    GateEntry { gate_bitmask: 0x01, duration_ns: 1000 },
                    GateEntry { gate_bitmask: 0x08, duration_ns: 1000 },
                ],
                cycle_time_ns: 0,
                base_time_ns: 0,
            })
            .unwrap();
        sched.set_cbs_config(3, shaped(10)).unwrap();
        fill(&sched, 0, 1);
        fill(&sched, 3, 1);
        fill(&sched, 7, 1);

        assert_eq!(sched.select_queue(500), Some(0));
        assert_eq!(sched.select_queue(1500), Some(3));
        assert_eq!(sched.oper_schedule().cycle_time_ns, 2000);
    }

    #[test]
    fn test_dequeue_debits_only_shaped_queues() {
        let mut sched = scheduler();
        sched.set_cbs_config(4, shaped(10)).unwrap();
        sched.enqueue(Frame::new(vec![0u8; 125]), 4).unwrap();
        sched.enqueue(Frame::new(vec![0u8; 125]), 6).unwrap();

        sched.dequeue(6);
        assert_eq!(sched.cbs_config(6).unwrap().current_credit, 0);

        sched.dequeue(4);
        let cbs = sched.cbs_config(4).unwrap();
        assert_eq!(cbs.last_update_time_ns, 10_000);
        assert_eq!(cbs.current_credit, 10_000 * -90 * cbs::CBS_SCALE_PER_NS);
    }

    #[test]
    fn test_enqueue_full_and_counters() {
        let mut sched = scheduler();
        fill(&sched, 3, ring::TX_RING_CAPACITY);

        let err = sched.enqueue(tagged(9), 3).unwrap_err();
        assert!(matches!(err, EnqueueError::QueueFull { queue: 3, .. }));
        assert_eq!(err.into_frame().data()[0], 9);

        let err = sched.enqueue(tagged(1), TSN_QUEUE_COUNT).unwrap_err();
        assert!(matches!(err, EnqueueError::InvalidQueue { .. }));

        sched.dequeue(3);
        let counters = sched.counters()[3];
        assert_eq!(counters.enqueued, ring::TX_RING_CAPACITY as u64);
        assert_eq!(counters.dropped, 1);
        assert_eq!(counters.transmitted, 1);
        assert_eq!(sched.queue_depths()[3], ring::TX_RING_CAPACITY - 1);
        assert_eq!(sched.peek(3).unwrap().data()[0], 3);
        assert!(sched.peek(2).is_none());
    }

    #[test]
    fn test_enqueue_from_another_thread() {
        let mut sched = scheduler();
        let handle = sched.enqueue_handle();
        std::thread::spawn(move || {
            for _ in 0..5 {
                handle.enqueue(tagged(6), 6).unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(sched.queue_depths()[6], 5);
        assert_eq!(sched.dequeue_next(0).unwrap().data()[0], 6);
    }

    #[test]
    fn test_schedule_validation() {
        let mut sched = scheduler();
        let too_long = TasSchedule {
            enabled: true,
            entries: vec![GateEntry { gate_bitmask: 0xff, duration_ns: 10 }; MAX_TAS_ENTRIES + 1],
            cycle_time_ns: 0,
            base_time_ns: 0,
        };
        assert_eq!(
            sched.set_tas_schedule(too_long),
            Err(ConfigError::TooManyEntries(MAX_TAS_ENTRIES + 1))
        );
        // Rejected schedule left the previous one in place
        assert_eq!(sched.oper_schedule(), &TsnConfig::default().tas);
        assert_eq!(sched.admin_schedule(), sched.oper_schedule());

        assert_eq!(
            sched.set_cbs_config(8, shaped(1)),
            Err(ConfigError::InvalidQueue(8))
        );
    }
}
