use std::time::{Duration, Instant};

/// Fires at most once per `period`, driven by the caller's loop.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    last: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Instant::now())
    }

    pub fn starting_at(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last: start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time since the last tick if a period has passed at `now`, restarting
    /// the period.
    pub fn tick_at(&mut self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last);
        if elapsed < self.period {
            return None;
        }
        self.last = now;
        Some(elapsed)
    }

    pub fn tick(&mut self) -> Option<Duration> {
        self.tick_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let start = Instant::now();
        let mut ticker = Ticker::starting_at(Duration::from_secs(10), start);
        assert_eq!(ticker.tick_at(start + Duration::from_secs(9)), None);
        assert_eq!(
            ticker.tick_at(start + Duration::from_secs(12)),
            Some(Duration::from_secs(12))
        );
        assert_eq!(ticker.tick_at(start + Duration::from_secs(15)), None);
        assert_eq!(
            ticker.tick_at(start + Duration::from_secs(22)),
            Some(Duration::from_secs(10))
        );
    }
}
