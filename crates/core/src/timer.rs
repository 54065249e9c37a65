//! Frame timer.

use std::time::{Duration, Instant};

/// Measures total elapsed time and per-frame deltas.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since the previous call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Delta in seconds since the previous tick, capped at `max_secs`.
    ///
    /// The cap keeps animation from jumping after the window was minimized
    /// and no frames were drawn for a while.
    pub fn delta_secs_capped(&mut self, max_secs: f32) -> f32 {
        self.tick().as_secs_f32().min(max_secs)
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_capped() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        let delta = timer.delta_secs_capped(0.001);
        assert!(delta <= 0.001);
    }

    #[test]
    fn test_reset_restarts_elapsed() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        timer.reset();
        assert!(timer.elapsed() < Duration::from_millis(2));
    }
}
