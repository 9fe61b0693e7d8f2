//! Credit-Based Shaper (802.1Qav style).
//!
//! Credit is kept as Q16.48 fixed point: the integer `hi_credit`/`lo_credit`
//! bounds are shifted left by 48 and slopes are multiplied by
//! `2^48 / 1e9` per nanosecond. Products are formed in i128 so that a long
//! idle period saturates at the bound instead of overflowing.

use log::trace;
use serde::{Deserialize, Serialize};

use super::ConfigError;

pub const CBS_FRACTION_BITS: u32 = 48;
/// 2^48 / 1e9, truncated
pub const CBS_SCALE_PER_NS: i64 = (1i64 << CBS_FRACTION_BITS) / 1_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbsConfig {
    pub enabled: bool,
    pub idle_slope: i16,
    pub send_slope: i16,
    pub hi_credit: i16,
    pub lo_credit: i16,
    /// Q16.48
    pub current_credit: i64,
    pub last_update_time_ns: u64,
}

impl CbsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hi_credit < self.lo_credit {
            return Err(ConfigError::InvalidCreditBounds {
                hi: self.hi_credit,
                lo: self.lo_credit,
            });
        }
        Ok(())
    }

    pub fn hi_bound(&self) -> i64 {
        (self.hi_credit as i64) << CBS_FRACTION_BITS
    }

    pub fn lo_bound(&self) -> i64 {
        (self.lo_credit as i64) << CBS_FRACTION_BITS
    }

    fn clamp(&self, credit: i128) -> i64 {
        credit.clamp(self.lo_bound() as i128, self.hi_bound() as i128) as i64
    }

    /// Same config with `current_credit` pulled into the bounds. Call after
    /// `validate`.
    pub fn clamped(mut self) -> Self {
        self.current_credit = self.clamp(self.current_credit as i128);
        self
    }

    /// Credit as of `now_ns` after idle-slope accrual.
    ///
    /// The accrued value is committed only when it is non-negative; a queue
    /// still in deficit keeps its last committed time and credit, so the
    /// returned value may differ from `current_credit`.
    pub fn accrue(&mut self, now_ns: u64) -> i64 {
        if now_ns < self.last_update_time_ns {
            return self.current_credit;
        }
        let elapsed = (now_ns - self.last_update_time_ns) as i128;
        let gained = self.idle_slope as i128 * elapsed * CBS_SCALE_PER_NS as i128;
        let credit = self.clamp(self.current_credit as i128 + gained);
        if credit >= 0 {
            self.current_credit = credit;
            self.last_update_time_ns = now_ns;
        }
        credit
    }

    /// Charge a transmission of `bits` at `link_speed_bps` against the credit.
    /// Returns the transmission time in ns.
    pub fn debit(&mut self, bits: u64, link_speed_bps: u64) -> u64 {
        let delta_time_ns = (bits as u128 * 1_000_000_000)
            .checked_div(link_speed_bps as u128)
            .unwrap_or(0) as u64;
        let delta_credit =
            delta_time_ns as i128 * self.send_slope as i128 * CBS_SCALE_PER_NS as i128;
        self.current_credit = self.clamp(self.current_credit as i128 + delta_credit);
        self.last_update_time_ns = self.last_update_time_ns.wrapping_add(delta_time_ns);
        trace!(
            "CBS debit {} bits: {} ns, credit {}",
            bits, delta_time_ns, self.current_credit
        );
        delta_time_ns
    }
}
