//! Capture node core logic.
//!
//! Hosts the capture loop on a [`WorkScheduler`], drains its region updates
//! and reports throughput until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tilecast_core::{CaptureService, SyntheticSource, TilecastError, WorkEvent, WorkScheduler};

use crate::config::NodeConfig;

/// How often the drain loop re-checks the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long shutdown waits for the cancelled capture loop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Totals for one [`CaptureNode::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSummary {
    /// Snapshots observed; consecutive cycles may coalesce into one.
    pub snapshots: u64,
    pub updates: u64,
    pub encoded_bytes: u64,
}

// ── CaptureNode ──────────────────────────────────────────────────

/// The top-level node: scheduler, capture service and output drain.
pub struct CaptureNode {
    config: NodeConfig,
    running: Arc<AtomicBool>,
}

impl CaptureNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that stops the node when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped, the capture loop ends, or `max_snapshots`
    /// snapshots have been observed.
    pub async fn run(&self, max_snapshots: Option<u64>) -> Result<NodeSummary, TilecastError> {
        self.running.store(true, Ordering::SeqCst);

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let scheduler = WorkScheduler::with_event_sink(self.config.scheduler.clone(), events_tx);

        let camera = &self.config.camera;
        let source = SyntheticSource::new(camera.width, camera.height, camera.pattern_step);
        let (service, mut outputs) = CaptureService::new(source, self.config.to_capture_config())?;
        let meter = service.meter();
        let capture = service.spawn(&scheduler, self.config.priorities.capture);
        info!(workers = scheduler.worker_count(), item = capture.id(), "capture loop submitted");

        let mut summary = NodeSummary::default();
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let mut report =
            tokio::time::interval(Duration::from_secs(self.config.logging.report_interval_secs.max(1)));

        while self.is_running() {
            tokio::select! {
                Some(update) = outputs.updates.recv() => {
                    summary.updates += 1;
                    summary.encoded_bytes += update.data.len() as u64;
                }
                Ok(()) = outputs.snapshots.changed() => {
                    summary.snapshots += 1;
                    if max_snapshots.is_some_and(|max| summary.snapshots >= max) {
                        info!(snapshots = summary.snapshots, "snapshot limit reached");
                        break;
                    }
                }
                Some(event) = events.recv() => {
                    if let WorkEvent::Failed(id, e) = event {
                        error!(item = id, "work item failed: {e}");
                    }
                }
                _ = report.tick() => {
                    let meter = meter.lock();
                    info!(
                        encoded_bps = meter.encoded_bps(),
                        ratio = format!("{:.1}", meter.compression_ratio()),
                        updates = summary.updates,
                        queued = scheduler.queued(),
                        "throughput"
                    );
                }
                _ = poll.tick() => {
                    if capture.is_finished() {
                        warn!("capture loop ended on its own");
                        break;
                    }
                }
            }
        }

        capture.cancel();
        let wound_down = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while !capture.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if wound_down.is_err() {
            warn!(grace = ?SHUTDOWN_GRACE, "capture loop did not stop in time");
        }
        // Encode items still in flight when the loop exited.
        while let Ok(update) = outputs.updates.try_recv() {
            summary.updates += 1;
            summary.encoded_bytes += update.data.len() as u64;
        }

        self.running.store(false, Ordering::SeqCst);
        let stats = scheduler.stats();
        info!(
            snapshots = summary.snapshots,
            updates = summary.updates,
            bytes = summary.encoded_bytes,
            completed = stats.completed,
            failed = stats.failed,
            "capture node stopped"
        );

        // Dropping the scheduler joins its worker threads. A loop that
        // missed the grace period is left to finish in the background.
        let teardown = tokio::task::spawn_blocking(move || drop(scheduler));
        if wound_down.is_ok() {
            if let Err(e) = teardown.await {
                warn!("scheduler teardown failed: {e}");
            }
        }
        Ok(summary)
    }
}

// ── Tests ────────────────────────────────────────────────────────
