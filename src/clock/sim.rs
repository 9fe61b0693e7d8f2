//! Free-running software NIC.
//!
//! Stands in for the DMA/register backend when the daemon runs without a TSN
//! card: the counter follows the host monotonic clock, transmitted frames latch
//! the TX timestamp registers and are then discarded. Nothing is ever
//! received.

use anyhow::Result;
use log::trace;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::HardwareClock;
use crate::frame::{Frame, RxFrame, TimestampId};
use crate::traits::FrameTransport;

#[derive(Debug, Default)]
struct NicState {
    tx_registers: [u64; TimestampId::REGISTER_COUNT],
    tx_frames: u64,
    tx_bytes: u64,
}

/// Cloneable handle; the clock side and the transport side share one NIC.
#[derive(Debug, Clone)]
pub struct SimulatedNic {
    epoch: Instant,
    tick_scale_ns: u32,
    state: Arc<Mutex<NicState>>,
}

impl SimulatedNic {
    pub fn new(tick_scale_ns: u32) -> Self {
        SimulatedNic {
            epoch: Instant::now(),
            tick_scale_ns: tick_scale_ns.max(1),
            state: Arc::new(Mutex::new(NicState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, NicState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (frames, bytes) written so far.
    pub fn tx_counters(&self) -> (u64, u64) {
        let state = self.state();
        (state.tx_frames, state.tx_bytes)
    }
}

impl HardwareClock for SimulatedNic {
    fn sys_count(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64 / self.tick_scale_ns as u64
    }

    fn tx_timestamp(&self, id: TimestampId) -> u64 {
        self.state().tx_registers[id.register_index()]
    }
}

impl FrameTransport for SimulatedNic {
    fn transmit(&mut self, frame: Frame) -> Result<()> {
        let ticks = self.sys_count();
        let mut state = self.state();
        if let Some(id) = frame.timestamp_id() {
            state.tx_registers[id.register_index()] = ticks;
        }
        state.tx_frames += 1;
        state.tx_bytes += frame.len() as u64;
        trace!("sim tx {} bytes at tick {}", frame.len(), ticks);
        Ok(())
    }

    fn recv_frame(&mut self) -> Result<Option<RxFrame>> {
        Ok(None)
    }
}
