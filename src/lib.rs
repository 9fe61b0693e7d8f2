pub mod clock;
pub mod config;
pub mod controller;
pub mod frame;
pub mod gptp;
pub mod ptp;
pub mod stats;
pub mod status;
pub mod traits;
pub mod tsn;
