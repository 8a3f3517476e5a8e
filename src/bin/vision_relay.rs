//! vision_relay - camera-to-MQTT detection relay
//!
//! This daemon:
//! 1. Opens every configured camera and starts its driver
//! 2. Ticks each camera, folding new frames and detections into its state
//! 3. Maps detections and tags into the shared record schema
//! 4. Publishes each camera's records to MQTT (or logs them in dry-run mode)
//! 5. Optionally writes a driver-station composite snapshot

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vision_relay::config::RelayConfig;
use vision_relay::display::SnapshotSink;
use vision_relay::transport::{LogSink, MqttSink, RecordSink};
use vision_relay::{open_sessions, spawn_camera_workers, Scheduler, TickLoop};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Relay per-camera detections from vision coprocessors to MQTT"
)]
struct Args {
    /// Path to the relay config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "VISION_CONFIG")]
    config: Option<PathBuf>,

    /// Log publications instead of connecting to the broker.
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many loop passes (sequential) or publications (per-camera).
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Sleep between loop passes, in milliseconds.
    #[arg(long, env = "VISION_TICK_INTERVAL_MS", default_value_t = 1)]
    tick_interval_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = RelayConfig::load_from(args.config.as_deref())?;
    log::info!(
        "vision_relay {} starting: {} camera(s), team {}, scheduler {:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.cameras.len(),
        cfg.network.team,
        cfg.vision.scheduler
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut sink: Box<dyn RecordSink> = if args.dry_run {
        Box::new(LogSink::new())
    } else {
        let settings = cfg.mqtt_settings()?;
        Box::new(MqttSink::connect(&settings).context("failed to connect to MQTT broker")?)
    };

    let interval = Duration::from_millis(args.tick_interval_ms);
    let overlay = cfg.vision.snapshot_path.is_some() && cfg.vision.scheduler == Scheduler::Sequential;
    let sessions = open_sessions(&cfg, overlay)?;

    match cfg.vision.scheduler {
        Scheduler::Sequential => {
            let mut tick_loop = TickLoop::new(sessions, sink).with_interval(interval);
            if let Some(path) = &cfg.vision.snapshot_path {
                log::info!("driver-station snapshots written to {}", path.display());
                tick_loop = tick_loop.with_snapshot(SnapshotSink::new(
                    path,
                    cfg.vision.ds_scale,
                    cfg.vision.ds_subsampling,
                ));
            }
            let result = tick_loop.run_until(&shutdown, args.max_ticks);
            log::info!("shutting down after {} passes", tick_loop.stats().passes);
            tick_loop.close()?;
            result
        }
        Scheduler::PerCamera => {
            let mut workers = spawn_camera_workers(sessions, interval, shutdown.clone())?;
            let result = workers.pump(sink.as_mut(), args.max_ticks);
            workers.join();
            sink.close()?;
            result.map(|forwarded| log::info!("shutting down after {} publications", forwarded))
        }
    }
}
