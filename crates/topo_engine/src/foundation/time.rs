//! Frame timing utilities

use std::time::{Duration, Instant};

/// Frame timer with a periodic frame-rate report
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
    report_frames: u64,
    report_elapsed: f32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            report_frames: 0,
            report_elapsed: 0.0,
        }
    }

    /// Advance by one frame (call once per loop iteration)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.advance(now.duration_since(self.last_frame));
        self.last_frame = now;
    }

    fn advance(&mut self, elapsed: Duration) {
        self.delta_time = elapsed.as_secs_f32();
        self.total_time += self.delta_time;
        self.frame_count += 1;
        self.report_frames += 1;
        self.report_elapsed += self.delta_time;
    }

    /// Seconds since the previous frame
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds since the timer was created
    pub const fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Frames counted so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the average frame rate once at least `interval` seconds have
    /// accumulated since the last report, then starts a new window.
    pub fn take_fps_report(&mut self, interval: f32) -> Option<f32> {
        if self.report_elapsed < interval || self.report_elapsed <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let fps = self.report_frames as f32 / self.report_elapsed;
        self.report_frames = 0;
        self.report_elapsed = 0.0;
        Some(fps)
    }
}

/// Stopwatch for one-off measurements such as effect load times
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Start a stopwatch now
    pub fn start_new() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds since start
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}
