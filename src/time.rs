//! Time facilities for simulation timing.
//!
//! Provides a universal source of truth for time-related values across the
//! simulation. Uses `std::time` for high-precision timing with no external
//! dependencies.
//!
//! # Example
//!
//! ```ignore
//! use scintilla::time::Time;
//!
//! let mut time = Time::new();
//!
//! // In your frame loop:
//! let (elapsed, delta) = time.update();
//! driver.tick_all(delta);
//! ```

use std::time::{Duration, Instant};

/// Time tracking for simulation frames.
///
/// Provides consistent timing information including elapsed time, delta
/// time, frame counting, and FPS calculation. A fixed delta can be set for
/// deterministic stepping (replays, tests, seeking).
#[derive(Debug)]
pub struct Time {
    /// When the timer was created.
    start: Instant,
    /// When the last frame occurred.
    last_frame: Instant,
    /// Total elapsed time in seconds (cached for fast access).
    elapsed_secs: f32,
    /// Time since last frame in seconds.
    delta_secs: f32,
    /// Total frames since start.
    frame_count: u64,
    /// Calculated FPS (updated periodically).
    fps: f32,
    /// Frame count at last FPS update.
    fps_frame_count: u64,
    /// Time of last FPS calculation.
    fps_update_time: Instant,
    /// How often to update FPS calculation.
    fps_update_interval: Duration,
    /// Whether time is paused.
    paused: bool,
    /// Fixed delta time for deterministic updates (optional).
    fixed_delta: Option<f32>,
    /// Time scale multiplier (1.0 = normal speed).
    time_scale: f32,
}

impl Time {
    /// Create a new time tracker starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
            paused: false,
            fixed_delta: None,
            time_scale: 1.0,
        }
    }

    /// Update timing values. Call once per frame.
    ///
    /// Returns `(elapsed_time, delta_time)` for convenience.
    pub fn update(&mut self) -> (f32, f32) {
        let now = Instant::now();

        if self.paused {
            self.delta_secs = 0.0;
            return (self.elapsed_secs, self.delta_secs);
        }

        let raw_delta = now.duration_since(self.last_frame).as_secs_f32();
        self.delta_secs = self.fixed_delta.unwrap_or(raw_delta) * self.time_scale;
        self.last_frame = now;
        self.elapsed_secs += self.delta_secs;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        (self.elapsed_secs, self.delta_secs)
    }

    /// Total elapsed simulation time in seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Time since last frame in seconds (delta time).
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Total frames since start.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second, averaged over the update interval.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Use a fixed delta time instead of wall-clock deltas. Makes stepping
    /// deterministic regardless of frame rate.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    /// Scale the passage of time (1.0 = normal, 0.5 = half speed).
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// Pause time; deltas become zero until resumed.
    pub fn set_paused(&mut self, paused: bool) {
        if !paused && self.paused {
            // Don't count the paused span as a giant delta.
            self.last_frame = Instant::now();
        }
        self.paused = paused;
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds since the tracker was created, wall clock.
    pub fn real_elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delta_is_deterministic() {
        let mut time = Time::new();
        time.set_fixed_delta(Some(0.016));
        let (_, d1) = time.update();
        let (_, d2) = time.update();
        assert_eq!(d1, 0.016);
        assert_eq!(d2, 0.016);
        assert_eq!(time.frame(), 2);
    }

    #[test]
    fn test_paused_delta_is_zero() {
        let mut time = Time::new();
        time.set_fixed_delta(Some(0.016));
        time.set_paused(true);
        let (_, d) = time.update();
        assert_eq!(d, 0.0);
        time.set_paused(false);
        let (_, d) = time.update();
        assert_eq!(d, 0.016);
    }

    #[test]
    fn test_time_scale() {
        let mut time = Time::new();
        time.set_fixed_delta(Some(0.02));
        time.set_time_scale(0.5);
        let (_, d) = time.update();
        assert_eq!(d, 0.01);
    }
}
