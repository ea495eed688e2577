//! Rolling-window throughput meter for encoded output.
//!
//! Records how many raw pixel bytes went into the codec and how many encoded
//! bytes came out, and derives rates and the compression ratio over the most
//! recent window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    raw: u64,
    encoded: u64,
}

/// Rolling-window throughput meter.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    samples: VecDeque<Sample>,
    window: Duration,
    window_raw: u64,
    window_encoded: u64,
    total_raw: u64,
    total_encoded: u64,
}

impl ThroughputMeter {
    /// A meter with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            window_raw: 0,
            window_encoded: 0,
            total_raw: 0,
            total_encoded: 0,
        }
    }

    /// Record one encoded unit at the current instant.
    pub fn record(&mut self, raw: u64, encoded: u64) {
        self.record_at(Instant::now(), raw, encoded);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, at: Instant, raw: u64, encoded: u64) {
        self.samples.push_back(Sample { at, raw, encoded });
        self.window_raw += raw;
        self.window_encoded += encoded;
        self.total_raw += raw;
        self.total_encoded += encoded;
        self.evict(at);
    }

    /// Encoded bytes/second over the window.
    pub fn encoded_bps(&self) -> u64 {
        self.rate(self.window_encoded)
    }

    /// Raw bytes/second over the window.
    pub fn raw_bps(&self) -> u64 {
        self.rate(self.window_raw)
    }

    /// Raw-to-encoded ratio over the window; `0.0` before any output.
    pub fn compression_ratio(&self) -> f64 {
        if self.window_encoded == 0 {
            return 0.0;
        }
        self.window_raw as f64 / self.window_encoded as f64
    }

    /// Lifetime `(raw, encoded)` byte totals.
    pub fn totals(&self) -> (u64, u64) {
        (self.total_raw, self.total_encoded)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn rate(&self, bytes: u64) -> u64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0;
        };
        let span = last.at.duration_since(first.at);
        let span = if span.is_zero() {
            Duration::from_millis(1)
        } else {
            span
        };
        (bytes as f64 / span.as_secs_f64()) as u64
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.samples.front() {
            if now.duration_since(front.at) <= self.window {
                break;
            }
            self.samples.pop_front();
            self.window_raw = self.window_raw.saturating_sub(front.raw);
            self.window_encoded = self.window_encoded.saturating_sub(front.encoded);
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_reports_zero() {
        let meter = ThroughputMeter::new();
        assert_eq!(meter.encoded_bps(), 0);
        assert_eq!(meter.compression_ratio(), 0.0);
    }

    #[test]
    fn rates_over_one_second() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(5));
        let t0 = Instant::now();
        meter.record_at(t0, 4096, 512);
        meter.record_at(t0 + Duration::from_secs(1), 4096, 512);
        assert_eq!(meter.encoded_bps(), 1024);
        assert_eq!(meter.raw_bps(), 8192);
        assert_eq!(meter.compression_ratio(), 8.0);
    }

    #[test]
    fn old_samples_leave_the_window_but_not_the_totals() {
        let mut meter = ThroughputMeter::with_window(Duration::from_millis(500));
        let t0 = Instant::now();
        meter.record_at(t0, 1000, 100);
        meter.record_at(t0 + Duration::from_secs(1), 500, 50);
        assert_eq!(meter.sample_count(), 1);
        assert_eq!(meter.compression_ratio(), 10.0);
        assert_eq!(meter.totals(), (1500, 150));
    }
}
