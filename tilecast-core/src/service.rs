//! Periodic capture service.
//!
//! Orchestrates the full pipeline:
//!
//! 1. A [`FrameSource`] delivers frames.
//! 2. The [`DeltaEngine`] folds them into the committed tile grid.
//! 3. The committed grid is published as a whole-grid snapshot.
//! 4. Dirty regions are encoded and sent as [`RegionUpdate`]s.
//!
//! [`CaptureService::run`] is the loop body hosted on the
//! [`WorkScheduler`]; region encoding is fanned out as higher-priority work
//! items so it pre-empts the next capture at the loop's checkpoints.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use crate::codec::{CodecConfig, REGION_SIZE};
use crate::delta::{DeltaConfig, DeltaEngine, TileGrid};
use crate::error::{TilecastError, WorkError};
use crate::meter::ThroughputMeter;
use crate::pipeline::{dirty_regions, RegionJob, RegionUpdate};
use crate::scheduler::{Priority, WorkHandle, WorkScheduler};
use crate::source::FrameSource;

/// Longest sleep between cancellation checks while pacing.
const PACE_SLICE: Duration = Duration::from_millis(10);

/// Raw luma bytes behind one region.
const REGION_RAW_BYTES: u64 = (REGION_SIZE * REGION_SIZE) as u64;

// ── CaptureConfig ────────────────────────────────────────────────

/// Configuration for [`CaptureService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target capture cycles per second.
    pub fps: u32,
    pub delta: DeltaConfig,
    pub codec: CodecConfig,
    /// Minimum priority for region-encoding items. Always raised above the
    /// capture loop's own priority.
    pub encode_priority: Priority,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            delta: DeltaConfig::default(),
            codec: CodecConfig::default(),
            encode_priority: 10,
        }
    }
}

impl CaptureConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Thresholds that may be changed while the service runs. Applied at the
/// start of the next cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuning {
    pub delta: DeltaConfig,
    pub codec: CodecConfig,
}

/// What one [`CaptureService::cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub changed_tiles: usize,
    pub dirty_regions: usize,
    pub encoded_bytes: usize,
    pub elapsed: Duration,
}

/// The consumer side of a [`CaptureService`].
pub struct CaptureOutputs {
    /// Latest committed grid. Replaced as a whole after every cycle.
    pub snapshots: watch::Receiver<Arc<TileGrid>>,
    /// Encoded dirty regions, in the order they finished.
    pub updates: mpsc::UnboundedReceiver<RegionUpdate>,
    /// Push new thresholds into the running service.
    pub tuning: watch::Sender<Tuning>,
}

// ── CaptureService ───────────────────────────────────────────────

/// Capture loop state: the source, the delta engine and the output channels.
pub struct CaptureService<S> {
    source: S,
    engine: DeltaEngine,
    config: CaptureConfig,
    snapshots: watch::Sender<Arc<TileGrid>>,
    updates: mpsc::UnboundedSender<RegionUpdate>,
    tuning: watch::Receiver<Tuning>,
    meter: Arc<Mutex<ThroughputMeter>>,
}

impl<S: FrameSource> CaptureService<S> {
    /// Build a service sized to `source`'s frames.
    pub fn new(source: S, config: CaptureConfig) -> Result<(Self, CaptureOutputs), TilecastError> {
        let (width, height) = source.frame_size();
        let engine = DeltaEngine::new(width, height, config.delta.clone())?;

        let (snap_tx, snap_rx) = watch::channel(engine.snapshot());
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (tuning_tx, tuning_rx) = watch::channel(Tuning {
            delta: config.delta.clone(),
            codec: config.codec.clone(),
        });

        info!(width, height, tiles = engine.tile_count(), fps = config.fps, "capture service created");

        let service = Self {
            source,
            engine,
            config,
            snapshots: snap_tx,
            updates: update_tx,
            tuning: tuning_rx,
            meter: Arc::new(Mutex::new(ThroughputMeter::new())),
        };
        let outputs = CaptureOutputs {
            snapshots: snap_rx,
            updates: update_rx,
            tuning: tuning_tx,
        };
        Ok((service, outputs))
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn engine(&self) -> &DeltaEngine {
        &self.engine
    }

    /// Shared throughput meter fed by every encoded region.
    pub fn meter(&self) -> Arc<Mutex<ThroughputMeter>> {
        Arc::clone(&self.meter)
    }

    /// Run one capture cycle and encode its dirty regions inline.
    pub fn cycle(&mut self) -> Result<CycleReport, TilecastError> {
        let started = Instant::now();
        let jobs = self.capture()?;

        let dirty = jobs.len();
        let mut encoded_bytes = 0;
        for job in jobs {
            let update = job.encode(&self.config.codec)?;
            encoded_bytes += update.data.len();
            publish(&self.updates, &self.meter, update);
        }

        let report = CycleReport {
            cycle: self.engine.cycles(),
            changed_tiles: self.engine.changed_count(),
            dirty_regions: dirty,
            encoded_bytes,
            elapsed: started.elapsed(),
        };
        debug!(
            cycle = report.cycle,
            changed = report.changed_tiles,
            regions = report.dirty_regions,
            bytes = report.encoded_bytes,
            "cycle complete"
        );
        Ok(report)
    }

    /// The capture loop, hosted on a scheduler.
    ///
    /// Each cycle fans region encoding out as work items above `handle`'s
    /// priority, waits for them, then paces to the configured frame rate.
    /// Returns [`WorkError::Cancelled`] once cancellation is observed; frame
    /// errors end the loop.
    pub fn run(&mut self, handle: &WorkHandle) -> Result<(), WorkError> {
        let interval = self.config.frame_interval();
        info!(item = handle.id(), ?interval, "capture loop started");

        loop {
            let started = Instant::now();
            if handle.yield_now() {
                break;
            }

            let jobs = self.capture()?;
            let priority = self
                .config
                .encode_priority
                .max(handle.priority().saturating_add(1));

            let pending: Vec<WorkHandle> = jobs
                .into_iter()
                .map(|job| {
                    let codec = self.config.codec.clone();
                    let updates = self.updates.clone();
                    let meter = Arc::clone(&self.meter);
                    handle.submit(priority, move |_| {
                        let update = job.encode(&codec)?;
                        publish(&updates, &meter, update);
                        Ok(())
                    })
                })
                .collect();

            for job in &pending {
                handle.wait_for(job)?;
            }
            trace!(cycle = self.engine.cycles(), regions = pending.len(), "regions encoded");

            if self.pace(handle, started, interval) {
                break;
            }
        }

        info!(item = handle.id(), cycles = self.engine.cycles(), "capture loop cancelled");
        Err(WorkError::Cancelled)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Apply tuning, run the delta engine, publish the snapshot and gather
    /// the dirty regions.
    fn capture(&mut self) -> Result<Vec<RegionJob>, TilecastError> {
        self.apply_tuning();
        let grid = self.engine.capture_cycle(&mut self.source)?;

        let jobs = dirty_regions(grid)
            .into_iter()
            .map(|(x, y)| RegionJob::from_tiles(grid, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        self.snapshots.send_replace(self.engine.snapshot());
        Ok(jobs)
    }

    fn apply_tuning(&mut self) {
        if !self.tuning.has_changed().unwrap_or(false) {
            return;
        }
        let tuning = self.tuning.borrow_and_update().clone();
        debug!(?tuning, "applying tuning");
        self.engine.set_config(tuning.delta.clone());
        self.config.delta = tuning.delta;
        self.config.codec = tuning.codec;
    }

    /// Sleep out the rest of the frame interval in short slices, yielding in
    /// between. Returns `true` if cancellation was observed.
    fn pace(&self, handle: &WorkHandle, started: Instant, interval: Duration) -> bool {
        loop {
            if handle.yield_now() {
                return true;
            }
            let elapsed = started.elapsed();
            if elapsed >= interval {
                return false;
            }
            std::thread::sleep((interval - elapsed).min(PACE_SLICE));
        }
    }
}

impl<S: FrameSource + 'static> CaptureService<S> {
    /// Submit the capture loop to `scheduler` at `priority`.
    pub fn spawn(self, scheduler: &WorkScheduler, priority: Priority) -> WorkHandle {
        scheduler.submit(priority, move |handle| {
            let mut service = self;
            service.run(handle)
        })
    }
}

fn publish(updates: &mpsc::UnboundedSender<RegionUpdate>, meter: &Mutex<ThroughputMeter>, update: RegionUpdate) {
    meter.lock().record(REGION_RAW_BYTES, update.data.len() as u64);
    if updates.send(update).is_err() {
        trace!("no update receiver");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_region;
    use crate::frame::RawFrame;
    use crate::scheduler::SchedulerConfig;
    use crate::source::SyntheticSource;

    /// Delivers `limit` synthetic frames, then fails.
    struct FlakySource {
        inner: SyntheticSource,
        limit: u64,
    }

    impl FrameSource for FlakySource {
        fn frame_size(&self) -> (u32, u32) {
            self.inner.frame_size()
        }

        fn next_frame(&mut self) -> Result<RawFrame, TilecastError> {
            if self.inner.frames_produced() >= self.limit {
                return Err(TilecastError::Capture("camera unplugged".into()));
            }
            self.inner.next_frame()
        }
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            fps: 1000,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn first_cycle_encodes_every_region() {
        let (mut service, mut outputs) =
            CaptureService::new(SyntheticSource::new(128, 64, 4), fast_config()).unwrap();

        let report = service.cycle().unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.changed_tiles, 8 * 4);
        assert_eq!(report.dirty_regions, 4 * 2);

        let mut received = 0;
        while let Ok(update) = outputs.updates.try_recv() {
            assert!(decode_region(&update.data).is_ok());
            received += 1;
        }
        assert_eq!(received, 8);
        assert!(outputs.snapshots.has_changed().unwrap());
        assert_eq!(outputs.snapshots.borrow_and_update().len(), 32);
        assert_eq!(service.meter().lock().totals().0, 8 * REGION_RAW_BYTES);
    }

    #[test]
    fn tuning_applies_on_next_cycle() {
        let (mut service, outputs) =
            CaptureService::new(SyntheticSource::new(64, 64, 1), fast_config()).unwrap();
        let tuned = DeltaConfig {
            per_pixel_threshold: 40,
            ..DeltaConfig::default()
        };
        outputs.tuning.send_replace(Tuning {
            delta: tuned.clone(),
            codec: CodecConfig::default(),
        });
        service.cycle().unwrap();
        assert_eq!(service.engine().config(), &tuned);
    }

    #[test]
    fn frame_error_ends_the_hosted_loop() {
        let scheduler = WorkScheduler::new(SchedulerConfig {
            workers: 0,
            ..SchedulerConfig::default()
        });
        let source = FlakySource {
            inner: SyntheticSource::new(64, 64, 2),
            limit: 3,
        };
        let (service, mut outputs) = CaptureService::new(source, fast_config()).unwrap();
        let handle = service.spawn(&scheduler, 0);

        scheduler.run_pending();

        assert!(handle.is_finished());
        let stats = scheduler.stats();
        assert_eq!(stats.failed, 1);
        // Encode items run nested inside the loop.
        assert!(stats.completed >= 4);

        let mut received = 0;
        while outputs.updates.try_recv().is_ok() {
            received += 1;
        }
        assert!(received >= 4, "first cycle alone dirties all four regions");
    }

    #[test]
    fn zero_fps_is_clamped() {
        let config = CaptureConfig {
            fps: 0,
            ..CaptureConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }
}
