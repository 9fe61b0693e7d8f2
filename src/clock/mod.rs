//! Corrected time base on top of a free-running hardware counter.
//!
//! The NIC exposes a monotonic tick counter (8ns per tick on the reference
//! board). Nanosecond timestamps are derived from it through a linear model
//!
//! ```text
//! timestamp_ns(t) = slope_int * t + (slope_frac * t) / SLOPE_RESOLUTION + offset_ns
//! ```
//!
//! The gPTP servo owns the model: phase corrections move `offset_ns`,
//! syntonization rewrites the slope.

pub mod sim;

use crate::config::ClockConfig;
use crate::frame::TimestampId;
use log::trace;

/// Denominator of the fractional slope. Larger values give finer rate
/// resolution at the cost of bigger intermediate products.
pub const SLOPE_RESOLUTION: i64 = 0x20_0000;

/// Register-level access to the NIC time base.
#[cfg_attr(test, mockall::automock)]
pub trait HardwareClock {
    /// Current value of the free-running counter.
    fn sys_count(&self) -> u64;

    /// Counter value latched when the last frame carrying `id` was sent.
    fn tx_timestamp(&self, id: TimestampId) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockModel {
    pub slope_int: i64,
    pub slope_frac: i64,
    pub offset_ns: u64,
}

impl ClockModel {
    pub fn new(tick_scale_ns: u32) -> Self {
        ClockModel {
            slope_int: tick_scale_ns as i64,
            slope_frac: 0,
            offset_ns: 0,
        }
    }

    pub fn timestamp_ns(&self, ticks: u64) -> u64 {
        let t = ticks as i128;
        let scaled = self.slope_int as i128 * t
            + (self.slope_frac as i128 * t) / SLOPE_RESOLUTION as i128;
        (scaled as u64).wrapping_add(self.offset_ns)
    }
}

pub struct Clock<H: HardwareClock> {
    hw: H,
    model: ClockModel,
    tick_scale_ns: u32,
    tx_adjust_ns: u64,
    rx_adjust_ns: u64,
}

impl<H: HardwareClock> Clock<H> {
    pub fn new(hw: H, config: &ClockConfig) -> Self {
        Clock {
            hw,
            model: ClockModel::new(config.tick_scale_ns),
            tick_scale_ns: config.tick_scale_ns,
            tx_adjust_ns: config.tx_adjust_ns,
            rx_adjust_ns: config.rx_adjust_ns,
        }
    }

    pub fn model(&self) -> &ClockModel {
        &self.model
    }

    pub fn tick_scale_ns(&self) -> u32 {
        self.tick_scale_ns
    }

    /// Raw counter value, uncorrected.
    pub fn ticks(&self) -> u64 {
        self.hw.sys_count()
    }

    pub fn now(&self) -> u64 {
        self.model.timestamp_ns(self.hw.sys_count())
    }

    pub fn timestamp_ns(&self, ticks: u64) -> u64 {
        self.model.timestamp_ns(ticks)
    }

    /// Raw counter value latched for `id`, uncorrected.
    pub fn tx_ticks(&self, id: TimestampId) -> u64 {
        self.hw.tx_timestamp(id)
    }

    /// Corrected egress time. The latch fires before the PHY puts the first
    /// bit on the wire, so the constant is added.
    pub fn tx_timestamp(&self, id: TimestampId) -> u64 {
        self.model
            .timestamp_ns(self.hw.tx_timestamp(id))
            .wrapping_add(self.tx_adjust_ns)
    }

    /// Corrected ingress time. The latch fires after the PHY has already
    /// received the frame, so the constant is subtracted.
    pub fn rx_timestamp(&self, hw_ticks: u64) -> u64 {
        self.model.timestamp_ns(hw_ticks).saturating_sub(self.rx_adjust_ns)
    }

    /// Change the clock rate to `ratio` (remote ns per local ns) without a
    /// jump at the instant of the change.
    pub fn adjust_slope(&mut self, ratio: f64) {
        let ticks = self.hw.sys_count();
        let before = self.model.timestamp_ns(ticks);

        let slope = ratio * self.tick_scale_ns as f64;
        let slope_int = slope.trunc();
        self.model.slope_int = slope_int as i64;
        self.model.slope_frac = ((slope - slope_int) * SLOPE_RESOLUTION as f64) as i64;

        let after = self.model.timestamp_ns(ticks);
        self.model.offset_ns = self.model.offset_ns.wrapping_add(before.wrapping_sub(after));

        trace!(
            "Clock slope {}+{}/{} (ratio {:.9})",
            self.model.slope_int, self.model.slope_frac, SLOPE_RESOLUTION, ratio
        );
    }

    /// Pure phase correction: the clock is moved back by `delta_ns`.
    pub fn apply_offset_correction(&mut self, delta_ns: i64) {
        self.model.offset_ns = self.model.offset_ns.wrapping_sub(delta_ns as u64);
    }
}
