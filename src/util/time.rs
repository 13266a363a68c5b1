//! Time utilities for game simulation

use std::time::Instant;

/// Simulation tick number
pub type Tick = i64;

/// Default tick rate of the simulation
pub const DEFAULT_TICK_SPEED: i64 = 50;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick clock shared by everything a simulation step touches.
///
/// All millisecond tunables are converted with `tick_speed * ms / 1000`, truncating,
/// so a window is always a whole number of ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTime {
    pub tick: Tick,
    pub tick_speed: i64,
}

impl GameTime {
    pub fn new(tick_speed: i64) -> Self {
        Self {
            tick: 0,
            tick_speed: tick_speed.max(1),
        }
    }

    /// Convert milliseconds to ticks
    pub fn ticks(&self, millis: i64) -> i64 {
        self.tick_speed * millis / 1000
    }

    /// Convert seconds to ticks
    pub fn ticks_f32(&self, seconds: f32) -> i32 {
        (self.tick_speed as f32 * seconds) as i32
    }

    /// True if `event` lies strictly more than `millis` in the past
    pub fn ago(&self, event: Tick, millis: i64) -> bool {
        event < self.tick - self.ticks(millis)
    }

    /// Seconds elapsed since `start`
    pub fn seconds_since(&self, start: Tick) -> f64 {
        (self.tick - start) as f64 / self.tick_speed as f64
    }

    pub fn advance(&mut self) {
        self.tick += 1;
    }
}

impl Default for GameTime {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_SPEED)
    }
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
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
    fn millis_convert_truncating() {
        let time = GameTime::new(50);
        assert_eq!(time.ticks(125), 6);
        assert_eq!(time.ticks(500), 25);
        assert_eq!(time.ticks(1000), 50);
        assert_eq!(time.ticks_f32(2.0), 100);
    }

    #[test]
    fn ago_is_strict() {
        let mut time = GameTime::new(50);
        time.tick = 100;
        // 1000ms == 50 ticks
        assert!(!time.ago(50, 1000));
        assert!(time.ago(49, 1000));
        assert!(!time.ago(100, 0));
        assert!(time.ago(99, 0));
    }
}
