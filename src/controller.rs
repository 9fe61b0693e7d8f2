//! Scheduler controller - the single owner of all time-sync and queue state.
//!
//! One cooperative loop drives everything:
//! 1. Drain received frames; PTP goes to the gPTP engine, the rest is ignored
//! 2. Every housekeeping interval, run gPTP housekeeping (decay check,
//!    grandmaster emission, Pdelay_Req)
//! 3. Ask the TSN scheduler for the next frame and hand it to the MAC
//!
//! The clock model is mutated by step 1 and 2 and read by step 3 on the same
//! thread, so none of it is locked. Only the transmit rings are shared, for
//! producers on other threads (see [`EnqueueHandle`]).

use anyhow::{Context, Result};
use log::{info, trace};
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, HardwareClock};
use crate::config::SystemConfig;
use crate::frame::{Frame, RxFrame, ETH_TYPE_PTPV2};
use crate::gptp::bmca::MasterState;
use crate::gptp::{GptpEngine, STAT_FREQUENCY, STAT_LINK_DELAY, STAT_OFFSET};
use crate::stats::StatSnapshot;
use crate::status::SchedulerStatus;
use crate::traits::FrameTransport;
use crate::tsn::cbs::CbsConfig;
use crate::tsn::tas::TasSchedule;
use crate::tsn::{ConfigError, EnqueueError, EnqueueHandle, TsnScheduler};

/// Upper bound on frames drained per iteration, so a receive burst cannot
/// starve transmission.
const MAX_RX_PER_ITERATION: usize = 32;

pub struct Scheduler<H, T>
where
    H: HardwareClock,
    T: FrameTransport,
{
    clock: Clock<H>,
    transport: T,
    gptp: GptpEngine,
    tsn: TsnScheduler,

    housekeeping_interval_ticks: u64,
    last_housekeeping_ticks: Option<u64>,

    // Shared status for readers outside the loop
    status_shared: Arc<RwLock<SchedulerStatus>>,
}

impl<H, T> Scheduler<H, T>
where
    H: HardwareClock,
    T: FrameTransport,
{
    pub fn new(
        hw: H,
        transport: T,
        config: &SystemConfig,
        status_shared: Arc<RwLock<SchedulerStatus>>,
    ) -> Result<Self> {
        let tsn = TsnScheduler::new(&config.tsn).context("Invalid TSN configuration")?;
        let gptp = GptpEngine::new(&config.gptp, config.decay_timeout_ticks());

        Ok(Scheduler {
            clock: Clock::new(hw, &config.clock),
            transport,
            gptp,
            tsn,
            housekeeping_interval_ticks: config.housekeeping_interval_ticks(),
            last_housekeeping_ticks: None,
            status_shared,
        })
    }

    pub fn clock(&self) -> &Clock<H> {
        &self.clock
    }

    pub fn gptp(&self) -> &GptpEngine {
        &self.gptp
    }

    pub fn tsn(&self) -> &TsnScheduler {
        &self.tsn
    }

    pub fn process_loop_iteration(&mut self) -> Result<()> {
        for _ in 0..MAX_RX_PER_ITERATION {
            match self.transport.recv_frame()? {
                Some(frame) => self.handle_rx(&frame)?,
                None => break,
            }
        }

        let now_ticks = self.clock.ticks();
        let due = self
            .last_housekeeping_ticks
            .map_or(true, |last| now_ticks.saturating_sub(last) >= self.housekeeping_interval_ticks);
        if due {
            self.last_housekeeping_ticks = Some(now_ticks);
            self.gptp.housekeeping(&mut self.clock, &mut self.transport)?;
            self.update_shared_status();
        }

        if let Some(frame) = self.tsn.dequeue_next(self.clock.now()) {
            self.transport.transmit(frame)?;
        }
        Ok(())
    }

    fn handle_rx(&mut self, frame: &RxFrame) -> Result<()> {
        match frame.ethertype() {
            Some(ETH_TYPE_PTPV2) => self.gptp.handle_frame(&mut self.clock, frame, &mut self.transport),
            other => {
                trace!("Ignoring frame with ethertype {:?}", other);
                Ok(())
            }
        }
    }

    // ========================================================================
    // PRODUCER / CONFIGURATION API
    // ========================================================================

    pub fn enqueue(&self, frame: Frame, queue: usize) -> Result<(), EnqueueError> {
        self.tsn.enqueue(frame, queue)
    }

    pub fn enqueue_handle(&self) -> EnqueueHandle {
        self.tsn.enqueue_handle()
    }

    /// Offset, frequency error and link delay.
    pub fn get_statistics(&self) -> [StatSnapshot; 3] {
        self.gptp.statistics()
    }

    pub fn reset_statistics(&mut self) {
        self.gptp.reset_statistics();
    }

    pub fn set_tas_schedule(&mut self, admin: TasSchedule) -> Result<(), ConfigError> {
        self.tsn.set_tas_schedule(admin)
    }

    pub fn set_cbs_config(&mut self, queue: usize, config: CbsConfig) -> Result<(), ConfigError> {
        self.tsn.set_cbs_config(queue, config)
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    pub fn log_status(&self) {
        let stats = self.get_statistics();
        let gm = self.gptp.grandmaster();
        let role = match self.gptp.state() {
            MasterState::NoMaster => "GM",
            MasterState::HasMaster => "SLAVE",
        };
        let offset = &stats[STAT_OFFSET];
        let delay = &stats[STAT_LINK_DELAY];
        if offset.num > 0 {
            info!(
                "[{}] gm={} offset mean={:.0}ns rms={:.0}ns max|{:.0}|ns n={} | delay={:.0}ns",
                role, gm.port_identity, offset.mean, offset.rms, offset.max_abs, offset.num, delay.mean
            );
        } else {
            info!(
                "[{}] gm={} no offset samples | delay={}ns",
                role,
                gm.port_identity,
                self.gptp.link_delay_ns()
            );
        }
        let counters = self.tsn.counters();
        let sent: u64 = counters.iter().map(|c| c.transmitted).sum();
        let dropped: u64 = counters.iter().map(|c| c.dropped).sum();
        info!(
            "[TSN] depths={:?} sent={} dropped={} tas={}",
            self.tsn.queue_depths(),
            sent,
            dropped,
            self.tsn.oper_schedule().enabled
        );
        self.update_shared_status();
    }

    fn update_shared_status(&self) {
        if let Ok(mut status) = self.status_shared.write() {
            let stats = self.gptp.statistics();
            let gm = self.gptp.grandmaster();
            status.master_state = self.gptp.state();
            status.grandmaster = gm.port_identity.to_string();
            status.grandmaster_priority1 = gm.priority1;
            status.grandmaster_priority2 = gm.priority2;
            status.link_delay_ns = self.gptp.link_delay_ns();
            status.offset = stats[STAT_OFFSET];
            status.frequency = stats[STAT_FREQUENCY];
            status.link_delay = stats[STAT_LINK_DELAY];
            status.tas_enabled = self.tsn.oper_schedule().enabled;
            status.queue_depths = self.tsn.queue_depths();
            status.queue_counters = self.tsn.counters();
            status.updated_ns = self.clock.now();
        }
    }
}
