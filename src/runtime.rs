//! Scheduling policies.
//!
//! `TickLoop` drives every session from one thread, one tick per camera per
//! pass. `spawn_camera_workers` gives each session its own thread instead;
//! sessions stay exclusively owned by their worker and publications are the
//! only thing handed across, one channel per camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Select};

use crate::config::RelayConfig;
use crate::detect::TagRecordBuilder;
use crate::display::SnapshotSink;
use crate::frame::ColorFrame;
use crate::ingest::open_camera;
use crate::session::{CameraSession, Publication};
use crate::transport::{publication_channel, ChannelSink, RecordSink};

const WORKER_QUEUE_CAPACITY: usize = 8;

/// Open every configured camera and wrap it in a session.
pub fn open_sessions(cfg: &RelayConfig, overlay: bool) -> Result<Vec<CameraSession>> {
    cfg.cameras
        .iter()
        .map(|camera| {
            let opened = open_camera(&cfg.driver_settings(camera))?;
            let normalizer = camera.detect_objects.then(|| cfg.normalizer());
            let tag_builder = camera
                .detect_tags
                .then(|| TagRecordBuilder::new(&cfg.vision.tag_family, camera.intrinsics));
            let session =
                CameraSession::from_opened(opened, normalizer, tag_builder).with_overlay(overlay);
            log::info!(
                "camera {}: session started ({:?})",
                session.name(),
                session.capability()
            );
            Ok(session)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub passes: u64,
    pub publications: u64,
    pub publish_failures: u64,
}

pub struct TickLoop {
    sessions: Vec<CameraSession>,
    sink: Box<dyn RecordSink>,
    snapshot: Option<SnapshotSink>,
    interval: Duration,
    stats: LoopStats,
}

impl TickLoop {
    pub fn new(sessions: Vec<CameraSession>, sink: Box<dyn RecordSink>) -> Self {
        Self {
            sessions,
            sink,
            snapshot: None,
            interval: Duration::from_millis(1),
            stats: LoopStats::default(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotSink) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sessions(&self) -> &[CameraSession] {
        &self.sessions
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// One pass over all sessions. Returns the number of publications.
    ///
    /// A faulted session is skipped from then on; a publish failure is
    /// logged and the pass continues.
    pub fn run_once(&mut self, now: Instant) -> usize {
        self.stats.passes += 1;
        let mut published = 0;
        for session in self.sessions.iter_mut() {
            let publication = match session.process(now) {
                Ok(Some(publication)) => publication,
                Ok(None) => continue,
                Err(err) => {
                    log::error!("{:#}", err);
                    continue;
                }
            };
            match self.sink.publish(&publication) {
                Ok(()) => {
                    published += 1;
                    self.stats.publications += 1;
                }
                Err(err) => {
                    self.stats.publish_failures += 1;
                    log::warn!("publish for camera {} failed: {}", publication.camera, err);
                }
            }
        }

        if published > 0 {
            if let Some(snapshot) = self.snapshot.as_mut() {
                let frames: Vec<&ColorFrame> = self
                    .sessions
                    .iter()
                    .filter_map(|s| s.display_frame())
                    .collect();
                if let Err(err) = snapshot.update(&frames) {
                    log::warn!("snapshot update failed: {}", err);
                }
            }
        }
        published
    }

    /// Run passes until `shutdown` is set, `max_passes` is reached, or every
    /// session has faulted.
    pub fn run_until(&mut self, shutdown: &AtomicBool, max_passes: Option<u64>) -> Result<()> {
        let mut passes = 0u64;
        while !shutdown.load(Ordering::SeqCst) {
            if max_passes.is_some_and(|max| passes >= max) {
                break;
            }
            self.run_once(Instant::now());
            passes += 1;
            if !self.sessions.is_empty() && self.sessions.iter().all(|s| s.is_faulted()) {
                return Err(anyhow!("all camera sessions faulted"));
            }
            std::thread::sleep(self.interval);
        }
        Ok(())
    }

    /// Stop drivers and close the sink.
    pub fn close(&mut self) -> Result<()> {
        for session in self.sessions.iter_mut() {
            session.close();
        }
        self.sink.close()
    }
}

/// Handles to per-camera worker threads and their publication queues.
pub struct CameraWorkers {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    receivers: Vec<Receiver<Publication>>,
}

/// One thread per session, each ticking its own camera every `interval`.
pub fn spawn_camera_workers(
    sessions: Vec<CameraSession>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> Result<CameraWorkers> {
    let mut handles = Vec::with_capacity(sessions.len());
    let mut receivers = Vec::with_capacity(sessions.len());
    for session in sessions {
        let (sink, rx) = publication_channel(WORKER_QUEUE_CAPACITY);
        let shutdown_thread = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(format!("session-{}", session.name()))
            .spawn(move || run_worker(session, sink, interval, &shutdown_thread))?;
        handles.push(handle);
        receivers.push(rx);
    }
    Ok(CameraWorkers {
        shutdown,
        handles,
        receivers,
    })
}

fn run_worker(
    mut session: CameraSession,
    mut sink: ChannelSink,
    interval: Duration,
    shutdown: &AtomicBool,
) {
    log::info!("camera {}: worker started", session.name());
    while !shutdown.load(Ordering::SeqCst) {
        match session.process(Instant::now()) {
            Ok(Some(publication)) => {
                if sink.publish(&publication).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("{:#}", err);
                break;
            }
        }
        std::thread::sleep(interval);
    }
    session.close();
    log::info!("camera {}: worker stopped", session.name());
}

impl CameraWorkers {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait up to `timeout` for the next publication from any worker.
    ///
    /// Returns `None` on timeout or when every worker has exited.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Publication> {
        let deadline = Instant::now() + timeout;
        while !self.receivers.is_empty() {
            let (index, received) = {
                let mut select = Select::new();
                for rx in &self.receivers {
                    select.recv(rx);
                }
                let op = select.select_deadline(deadline).ok()?;
                let index = op.index();
                (index, op.recv(&self.receivers[index]))
            };
            match received {
                Ok(publication) => return Some(publication),
                Err(_) => {
                    self.receivers.remove(index);
                }
            }
        }
        None
    }

    /// Forward publications to `sink` until shutdown, `max_publications`, or
    /// all workers exit.
    pub fn pump(
        &mut self,
        sink: &mut dyn RecordSink,
        max_publications: Option<u64>,
    ) -> Result<u64> {
        let mut forwarded = 0u64;
        while !self.shutdown.load(Ordering::SeqCst) {
            if max_publications.is_some_and(|max| forwarded >= max) {
                break;
            }
            if self.receivers.is_empty() {
                return Err(anyhow!("all camera workers exited"));
            }
            let Some(publication) = self.recv_timeout(Duration::from_millis(100)) else {
                continue;
            };
            if let Err(err) = sink.publish(&publication) {
                log::warn!("publish for camera {} failed: {}", publication.camera, err);
                continue;
            }
            forwarded += 1;
        }
        Ok(forwarded)
    }

    /// Signal every worker and wait for them to finish.
    pub fn join(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock workers waiting on a full queue.
        self.receivers.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("camera worker panicked");
            }
        }
    }
}
