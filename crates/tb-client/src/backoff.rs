//! Reconnect delay schedule

use std::time::Duration;

use tb_core::config::ReconnectConfig;

/// Growing delay between reconnect attempts
///
/// Each call to [`next_delay`](Self::next_delay) returns the current step and
/// scales the following one by `multiplier`, never past `ceiling`. Any step
/// that cannot be represented as a `Duration` (overflow, NaN) is pinned to
/// the ceiling.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    step: Duration,
    ceiling: Duration,
    multiplier: f64,
    /// Extra random fraction of each step, 0.0 to 1.0
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            config.base_delay,
            config.max_delay,
            config.multiplier,
            config.jitter,
        )
    }

    pub fn new(base: Duration, ceiling: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            step: base.min(ceiling),
            ceiling,
            multiplier,
            jitter,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.step;
        self.step = self.scaled(delay);
        delay + self.spread(delay)
    }

    fn scaled(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map_or(self.ceiling, |next| next.min(self.ceiling))
    }

    fn spread(&self, delay: Duration) -> Duration {
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return Duration::ZERO;
        }
        let fraction = self.jitter.min(1.0) * rand::random::<f64>();
        Duration::try_from_secs_f64(delay.as_secs_f64() * fraction).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles() {
        let mut backoff = ExponentialBackoff::from_config(&ReconnectConfig::default());

        let delays: Vec<Duration> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_schedule_stops_at_ceiling() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_base_above_ceiling_is_clamped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(90), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_unrepresentable_steps_pin_to_ceiling() {
        let ceiling = Duration::from_secs(60);
        for multiplier in [f64::NAN, f64::INFINITY, f64::MAX] {
            let mut backoff =
                ExponentialBackoff::new(Duration::from_secs(1), ceiling, multiplier, 0.0);

            assert_eq!(backoff.next_delay(), Duration::from_secs(1));
            assert_eq!(backoff.next_delay(), ceiling, "multiplier {}", multiplier);
            assert_eq!(backoff.next_delay(), ceiling);
        }
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 1.0, 0.5);

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_nan_jitter_adds_nothing() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0, f64::NAN);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
