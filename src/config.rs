use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::tsn::cbs::CbsConfig;
use crate::tsn::tas::{GateEntry, TasSchedule};
use crate::tsn::TSN_QUEUE_COUNT;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub clock: ClockConfig,
    pub gptp: GptpConfig,
    pub tsn: TsnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_scale_ns: u32,   // 8ns tick = 125MHz counter
    pub tx_adjust_ns: u64,    // TEMAC + PHY egress latency
    pub rx_adjust_ns: u64,    // TEMAC + PHY ingress latency
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GptpConfig {
    pub mac: [u8; 6],
    pub port_number: u16,
    pub priority1: u8,
    pub priority2: u8,
    pub domain_number: u8,
    pub decay_timeout_ms: u64,
    pub housekeeping_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsnConfig {
    pub link_speed_bps: u64,
    pub tas: TasSchedule,
    pub cbs: [CbsConfig; TSN_QUEUE_COUNT],
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            tick_scale_ns: 8,
            tx_adjust_ns: 708 + 60,
            rx_adjust_ns: 1920 + 240,
        }
    }
}

impl Default for GptpConfig {
    fn default() -> Self {
        GptpConfig {
            mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            port_number: 1,
            priority1: 248,
            priority2: 248,
            domain_number: 0,
            decay_timeout_ms: 1000,
            housekeeping_interval_ms: 1000,
        }
    }
}

impl Default for TsnConfig {
    fn default() -> Self {
        TsnConfig {
            link_speed_bps: 100_000_000,
            // Half-second closed/open test pattern, off until explicitly enabled
            tas: TasSchedule {
                enabled: false,
                entries: vec![
                    GateEntry { gate_bitmask: 0x00, duration_ns: 500_000_000 },
                    GateEntry { gate_bitmask: 0xff, duration_ns: 500_000_000 },
                ],
                cycle_time_ns: 1_000_000_000,
                base_time_ns: 0,
            },
            cbs: [CbsConfig::default(); TSN_QUEUE_COUNT],
        }
    }
}

impl ClockConfig {
    pub fn ticks_per_ms(&self) -> u64 {
        1_000_000 / self.tick_scale_ns.max(1) as u64
    }
}

impl SystemConfig {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn decay_timeout_ticks(&self) -> u64 {
        self.gptp.decay_timeout_ms * self.clock.ticks_per_ms()
    }

    pub fn housekeeping_interval_ticks(&self) -> u64 {
        self.gptp.housekeeping_interval_ms * self.clock.ticks_per_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_hardware() {
        let config = SystemConfig::default();
        assert_eq!(config.clock.tick_scale_ns, 8);
        assert_eq!(config.clock.tx_adjust_ns, 768);
        assert_eq!(config.clock.rx_adjust_ns, 2160);
        // 1s at 125MHz
        assert_eq!(config.decay_timeout_ticks(), 125_000_000);
        assert_eq!(config.housekeeping_interval_ticks(), 125_000_000);
        assert!(!config.tsn.tas.enabled);
        assert!(config.tsn.cbs.iter().all(|c| !c.enabled));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "gptp": {{ "priority1": 100, "mac": [2, 0, 0, 0, 0, 1] }}, "tsn": {{ "link_speed_bps": 1000000000 }} }}"#
        )
        .unwrap();

        let config = SystemConfig::load(file.path()).unwrap();
        assert_eq!(config.gptp.priority1, 100);
        assert_eq!(config.gptp.priority2, 248);
        assert_eq!(config.gptp.mac, [2, 0, 0, 0, 0, 1]);
        assert_eq!(config.tsn.link_speed_bps, 1_000_000_000);
        assert_eq!(config.tsn.tas.entries.len(), 2);
        assert_eq!(config.clock, ClockConfig::default());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SystemConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(SystemConfig::load(Path::new("/nonexistent/tsnsyncd.json")).is_err());
    }
}
