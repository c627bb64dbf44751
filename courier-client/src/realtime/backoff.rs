//! Reconnect backoff

use rand::Rng;
use std::time::Duration;

use super::RealtimeConfig;

/// Exponential backoff with bounded upward jitter
///
/// The delay handed out is `min(base + U[0, base * ratio], max)` where
/// `base` doubles per call. With `ratio <= 1` the sequence never
/// decreases.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter_ratio: f64,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            initial,
            max,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
            current: initial.min(max),
            attempt: 0,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        let config = config.clone().normalized();
        Self::new(
            config.reconnect_delay,
            config.max_reconnect_delay,
            config.jitter_ratio,
        )
    }

    /// Delay before the next attempt; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempt += 1;

        let extra = base.as_secs_f64() * self.jitter_ratio;
        let jitter = if extra > 0.0 {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..extra))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(self.max)
    }

    /// Base delay the next call will start from
    pub fn base(&self) -> Duration {
        self.current
    }

    /// Delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_base_schedule_doubles_to_cap() {
        let mut backoff = Backoff::new(secs(1), secs(30), 0.0);
        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                secs(1),
                secs(2),
                secs(4),
                secs(8),
                secs(16),
                secs(30),
                secs(30),
                secs(30)
            ]
        );
    }

    #[test]
    fn test_jittered_delays_never_decrease() {
        for _ in 0..50 {
            let mut backoff = Backoff::new(secs(1), secs(30), 0.2);
            let mut last = Duration::ZERO;
            for _ in 0..12 {
                let delay = backoff.next_delay();
                assert!(delay >= last, "{delay:?} < {last:?}");
                assert!(delay <= secs(30));
                last = delay;
            }
        }
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let mut backoff = Backoff::new(secs(4), secs(30), 0.2);
        let delay = backoff.next_delay();
        assert!(delay >= secs(4));
        assert!(delay <= Duration::from_millis(4800));
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(secs(1), secs(30), 0.0);
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), secs(1));
    }
}
