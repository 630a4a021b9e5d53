use std::{sync::Arc, time::Instant};

/// Snapshot reported to progress callbacks.
///
/// `total` is `0` while the size is still unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
    pub speed_bps: f64,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Transfer-speed estimator sampled once per second.
///
/// Per-read recomputation would make the reported speed jitter with socket
/// scheduling; one-second windows match what the download UI can usefully
/// display.
pub(crate) struct SpeedMeter {
    window_start: Instant,
    window_bytes: u64,
    speed_bps: f64,
}

impl SpeedMeter {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_bytes: 0,
            speed_bps: 0.0,
        }
    }

    /// Record `bytes` read at `now`; returns the current estimate.
    pub(crate) fn record(&mut self, bytes: u64, now: Instant) -> f64 {
        self.window_bytes += bytes;
        let elapsed = now.duration_since(self.window_start);
        if elapsed.as_secs_f64() >= 1.0 {
            self.speed_bps = self.window_bytes as f64 / elapsed.as_secs_f64();
            self.window_start = now;
            self.window_bytes = 0;
        }
        self.speed_bps
    }
}
