//! Admission pacing.

use std::time::Duration;

use tokio::time::Instant;

/// Hands out invocation start times.
///
/// Every admission starts at least `min_delay` after it was admitted, and no
/// two starts are closer than `min_delay` to each other, so a burst of
/// admissions is spread out instead of hitting the upstream together.
#[derive(Debug)]
pub(crate) struct Pacer {
    min_delay: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_start: None,
        }
    }

    /// Reserve the start time for an admission happening at `now`.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let earliest = now + self.min_delay;
        let start = match self.last_start {
            Some(prev) => earliest.max(prev + self.min_delay),
            None => earliest,
        };
        self.last_start = Some(start);
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admission_waits_min_delay() {
        let now = Instant::now();
        let mut pacer = Pacer::new(Duration::from_millis(200));
        assert_eq!(pacer.reserve(now), now + Duration::from_millis(200));
    }

    #[test]
    fn burst_is_spread_by_min_delay() {
        let now = Instant::now();
        let mut pacer = Pacer::new(Duration::from_millis(200));
        let starts: Vec<_> = (0..3).map(|_| pacer.reserve(now)).collect();
        assert_eq!(starts[1] - starts[0], Duration::from_millis(200));
        assert_eq!(starts[2] - starts[1], Duration::from_millis(200));
    }

    #[test]
    fn idle_gap_resets_to_plain_delay() {
        let now = Instant::now();
        let mut pacer = Pacer::new(Duration::from_millis(200));
        pacer.reserve(now);
        let later = now + Duration::from_secs(5);
        assert_eq!(pacer.reserve(later), later + Duration::from_millis(200));
    }

    #[test]
    fn zero_delay_starts_immediately() {
        let now = Instant::now();
        let mut pacer = Pacer::new(Duration::ZERO);
        assert_eq!(pacer.reserve(now), now);
        assert_eq!(pacer.reserve(now), now);
    }
}
