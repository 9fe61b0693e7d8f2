use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tsn_gptp::clock::sim::SimulatedNic;
use tsn_gptp::config::SystemConfig;
use tsn_gptp::controller::Scheduler;
use tsn_gptp::status::SchedulerStatus;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; built-in defaults if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the status snapshot here as JSON every status interval
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn write_status(path: &Path, status: &RwLock<SchedulerStatus>) -> Result<()> {
    let json = match status.read() {
        Ok(s) => serde_json::to_string_pretty(&*s)?,
        Err(_) => return Ok(()),
    };
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write status file {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };
    info!(
        "Link {} Mbit/s, {}ns ticks, housekeeping every {}ms",
        config.tsn.link_speed_bps / 1_000_000,
        config.clock.tick_scale_ns,
        config.gptp.housekeeping_interval_ms
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    // No hardware backend linked in: run on the free-running software NIC
    let nic = SimulatedNic::new(config.clock.tick_scale_ns);
    info!("Using simulated NIC time base");

    let status = Arc::new(RwLock::new(SchedulerStatus::default()));
    let mut scheduler = Scheduler::new(nic.clone(), nic.clone(), &config, Arc::clone(&status))?;

    info!("Starting scheduler loop...");
    let mut last_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_log.elapsed() >= Duration::from_secs(10) {
            scheduler.log_status();
            if let Some(path) = &args.status_file {
                if let Err(e) = write_status(path, &status) {
                    warn!("{:#}", e);
                }
            }
            last_log = Instant::now();
        }

        if let Err(e) = scheduler.process_loop_iteration() {
            warn!("Error in loop: {}", e);
        }

        thread::sleep(Duration::from_millis(1));
    }

    let (frames, bytes) = nic.tx_counters();
    info!("Exiting. {} frames / {} bytes transmitted.", frames, bytes);
    Ok(())
}
