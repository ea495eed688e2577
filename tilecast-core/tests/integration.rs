//! Integration tests: capture loop hosted on a live scheduler, and the
//! tiles → regions → stream path checked against what the decoder sees.

use std::sync::Arc;
use std::time::Duration;

use tilecast_core::codec::{decode_region, REGION_SIZE};
use tilecast_core::{
    CaptureConfig, CaptureService, CodecConfig, CompressedImage, DeltaConfig, DeltaEngine, FrameSource, Region,
    RegionJob, SchedulerConfig, SyntheticSource, WorkEvent, WorkScheduler,
};
use tokio::sync::mpsc;

// ── Helpers ──────────────────────────────────────────────────────

fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timeout");
}

// ── Hosted capture ───────────────────────────────────────────────

#[tokio::test]
async fn test_capture_loop_on_worker_pool() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let scheduler = WorkScheduler::with_event_sink(
        SchedulerConfig {
            workers: 2,
            ..SchedulerConfig::default()
        },
        events_tx,
    );

    let config = CaptureConfig {
        fps: 200,
        ..CaptureConfig::default()
    };
    let (service, mut outputs) = CaptureService::new(SyntheticSource::new(128, 96, 8), config).unwrap();
    let capture = service.spawn(&scheduler, 0);

    // The first cycle dirties all 4 × 3 regions.
    for _ in 0..12 {
        let update = tokio::time::timeout(Duration::from_secs(5), outputs.updates.recv())
            .await
            .expect("timeout")
            .expect("update channel closed");
        assert!(update.x < 4 && update.y < 3);
        assert!(decode_region(&update.data).is_ok());
    }

    outputs.snapshots.changed().await.unwrap();
    let snapshot = Arc::clone(&outputs.snapshots.borrow_and_update());
    assert_eq!((snapshot.width(), snapshot.height()), (8, 6));

    capture.cancel();
    wait_until(|| capture.is_finished()).await;

    let mut cancelled = false;
    while let Ok(event) = events_rx.try_recv() {
        if event == WorkEvent::Cancelled(capture.id()) {
            cancelled = true;
        }
        assert!(!matches!(event, WorkEvent::Failed(..)), "unexpected failure: {event:?}");
    }
    assert!(cancelled);
    assert_eq!(scheduler.stats().cancelled, 1);
}

#[tokio::test]
async fn test_tuning_reaches_running_loop() {
    let scheduler = WorkScheduler::new(SchedulerConfig {
        workers: 1,
        ..SchedulerConfig::default()
    });
    let config = CaptureConfig {
        fps: 200,
        ..CaptureConfig::default()
    };
    // Static scene: only the first cycle produces updates.
    let (service, mut outputs) = CaptureService::new(SyntheticSource::new(64, 64, 0), config).unwrap();
    let capture = service.spawn(&scheduler, 0);

    for _ in 0..4 {
        tokio::time::timeout(Duration::from_secs(5), outputs.updates.recv())
            .await
            .expect("timeout")
            .expect("update channel closed");
    }

    // A zero age limit refreshes every tile on each following cycle.
    outputs.tuning.send_replace(tilecast_core::Tuning {
        delta: DeltaConfig {
            max_tile_age_ms: 0,
            ..DeltaConfig::default()
        },
        codec: CodecConfig::default(),
    });

    // Every tile has aged past zero, so the next cycle refreshes them all.
    let update = tokio::time::timeout(Duration::from_secs(5), outputs.updates.recv())
        .await
        .expect("tuning never produced a refresh")
        .expect("update channel closed");
    assert!(update.x < 2 && update.y < 2);

    capture.cancel();
    wait_until(|| capture.is_finished()).await;
}

#[tokio::test]
async fn test_cancel_during_fan_out_on_single_worker() {
    for delay_us in [200, 500, 1_000, 2_000, 4_000] {
        let scheduler = WorkScheduler::new(SchedulerConfig {
            workers: 1,
            ..SchedulerConfig::default()
        });
        let config = CaptureConfig {
            fps: 1000,
            ..CaptureConfig::default()
        };
        let (service, _outputs) = CaptureService::new(SyntheticSource::new(512, 512, 8), config).unwrap();
        let capture = service.spawn(&scheduler, 0);

        tokio::time::sleep(Duration::from_micros(delay_us)).await;
        capture.cancel();
        wait_until(|| capture.is_finished()).await;
        assert_eq!(scheduler.stats().cancelled, 1);
    }
}

// ── Tiles → regions → stream ─────────────────────────────────────

#[test]
fn test_region_updates_reconstruct_committed_pixels() {
    let mut source = SyntheticSource::new(96, 64, 4);
    let (w, h) = source.frame_size();
    let mut engine = DeltaEngine::new(w, h, DeltaConfig::default()).unwrap();
    let codec = CodecConfig::default();

    for _ in 0..3 {
        let grid = engine.capture_cycle(&mut source).unwrap();
        for (rx, ry) in tilecast_core::dirty_regions(grid) {
            let job = RegionJob::from_tiles(grid, rx, ry).unwrap();
            let update = job.encode(&codec).unwrap();
            let decoded = Region::from_blocks(decode_region(&update.data).unwrap());

            // Fit error plus at most one shared block's worth of drift.
            let err = max_abs_diff(&decoded.to_luma(), job.luma());
            assert!(err <= 32, "region ({rx}, {ry}) error {err}");
        }
    }
}

#[test]
fn test_compressed_image_tracks_moving_square() {
    let mut source = SyntheticSource::new(128, 64, 16);
    let (w, h) = source.frame_size();
    let mut engine = DeltaEngine::new(w, h, DeltaConfig::default()).unwrap();
    let codec = CodecConfig::default();

    engine.capture_cycle(&mut source).unwrap();
    let before = CompressedImage::from_tile_grid(engine.committed()).unwrap();
    engine.capture_cycle(&mut source).unwrap();
    let after = CompressedImage::from_tile_grid(engine.committed()).unwrap();

    assert_eq!((after.width(), after.height()), (128, 64));
    assert_eq!(after.regions_wide() * REGION_SIZE, 128);

    let changes = after.compare(&before, &codec).unwrap();
    let changed: Vec<_> = changes.enumerate().filter(|(_, _, c)| **c).map(|(x, y, _)| (x, y)).collect();
    assert!(!changed.is_empty(), "the square moved");
    // The 8-pixel square moved from x = 0 to x = 16, inside the first region column.
    assert!(changed.iter().all(|&(x, _)| x == 0));
    assert!(changed.len() < changes.len(), "static background regions stay unchanged");
}
