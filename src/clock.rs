use std::time::Duration;

/// Elapsed-time tracker driven by timestamps supplied by the host.
///
/// `get_delta` consumes the time accumulated since the previous read, so two
/// reads at the same instant return a zero delta for the second one. A
/// stopped clock always reports zero.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    running: bool,
    old_time: Duration,
    elapsed: Duration,
}

impl Clock {
    /// Creates a stopped clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the clock. Does nothing when it is already running.
    pub fn start(&mut self, now: Duration) {
        if self.running {
            return;
        }
        self.running = true;
        self.old_time = now;
    }

    /// Stops the clock, folding the time since the last read into the total.
    pub fn stop(&mut self, now: Duration) {
        if !self.running {
            return;
        }
        self.get_delta(now);
        self.running = false;
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Seconds since the previous read; resets the accumulator.
    pub fn get_delta(&mut self, now: Duration) -> f32 {
        if !self.running {
            return 0.0;
        }
        let delta = now.saturating_sub(self.old_time);
        self.old_time = now;
        self.elapsed += delta;
        delta.as_secs_f32()
    }

    /// Total running time in seconds, excluding paused intervals.
    pub fn elapsed(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }
}
