use std::time::Duration;

/// Repeating timer expressed as a deadline, polled by the host.
///
/// Deadlines advance by whole periods from the start time, so late polls
/// report every missed fire instead of drifting.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Duration>,
}

impl IntervalTimer {
    /// Creates an idle timer. Zero periods are bumped to one millisecond.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    /// Arms the timer so the first fire happens one period after `now`.
    pub fn start(&mut self, now: Duration) {
        self.next_due = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.next_due
    }

    /// Returns how many periods have elapsed since the last poll.
    pub fn poll(&mut self, now: Duration) -> u32 {
        let Some(mut due) = self.next_due else {
            return 0;
        };
        let mut fires = 0;
        while due <= now {
            fires += 1;
            due += self.period;
        }
        self.next_due = Some(due);
        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn idle_timer_never_fires() {
        let mut timer = IntervalTimer::new(ms(3000));
        assert_eq!(timer.poll(ms(60_000)), 0);
        assert!(!timer.is_active());
    }

    #[test]
    fn fires_once_per_period() {
        let mut timer = IntervalTimer::new(ms(3000));
        timer.start(ms(100));
        assert_eq!(timer.poll(ms(3099)), 0);
        assert_eq!(timer.poll(ms(3100)), 1);
        assert_eq!(timer.poll(ms(3100)), 0);
        assert_eq!(timer.poll(ms(6050)), 0);
        assert_eq!(timer.poll(ms(6100)), 1);
        assert_eq!(timer.next_deadline(), Some(ms(9100)));
    }

    #[test]
    fn late_poll_reports_missed_fires() {
        let mut timer = IntervalTimer::new(ms(3000));
        timer.start(ms(0));
        assert_eq!(timer.poll(ms(9500)), 3);
        assert_eq!(timer.next_deadline(), Some(ms(12_000)));
    }

    #[test]
    fn cancelled_timer_stays_quiet() {
        let mut timer = IntervalTimer::new(ms(3000));
        timer.start(ms(0));
        timer.cancel();
        assert_eq!(timer.poll(ms(10_000)), 0);
        assert_eq!(timer.next_deadline(), None);
    }
}
