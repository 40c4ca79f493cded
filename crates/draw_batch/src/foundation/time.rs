//! Time management utilities

use std::time::{Duration, Instant};

/// Benchmark clock driven by the per-frame deltas handed to `animate`
///
/// Elapsed time starts counting at the first animated frame: that frame sees
/// `0.0`, every later frame adds its delta. Wall time is never consulted.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    started: bool,
    elapsed: f32,
    frame_count: u64,
}

impl FrameClock {
    /// Create a clock that has not seen any frame yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame and return the elapsed time since the first frame
    pub fn advance(&mut self, time_delta: f32) -> f32 {
        if self.started {
            self.elapsed += time_delta.max(0.0);
        } else {
            self.started = true;
        }
        self.frame_count += 1;
        self.elapsed
    }

    /// Elapsed time since the first animated frame, in the driver's unit
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Number of frames seen so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Whether at least one frame has been animated
    pub fn is_started(&self) -> bool {
        self.started
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        let running = self.start_time.map_or(Duration::ZERO, |start| start.elapsed());
        self.elapsed + running
    }

    /// Get the elapsed time in microseconds
    pub fn elapsed_micros(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }
}
