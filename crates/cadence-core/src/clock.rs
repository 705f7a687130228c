use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock source plus the blocking wait used between polls.
///
/// Production injects [`SystemClock`]; tests share a [`VirtualClock`] between the runner
/// and the simulated platform so a one-hour run completes instantly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Manually driven clock. `sleep` advances time instantly unless the clock is frozen.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    inner: Arc<Mutex<VirtualState>>,
}

#[derive(Debug)]
struct VirtualState {
    now: DateTime<Utc>,
    frozen: bool,
    sleeps: Vec<Duration>,
}

impl VirtualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { inner: Arc::new(Mutex::new(VirtualState { now, frozen: false, sleeps: vec![] })) }
    }

    /// A frozen clock records sleeps but never moves.
    pub fn freeze(&self) {
        self.inner.lock().unwrap().frozen = true;
    }

    pub fn advance(&self, d: Duration) {
        let mut s = self.inner.lock().unwrap();
        s.now += chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero());
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.inner.lock().unwrap().sleeps.iter().sum()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, d: Duration) {
        let mut s = self.inner.lock().unwrap();
        s.sleeps.push(d);
        if !s.frozen {
            s.now += chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn virtual_sleep_advances_shared_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = VirtualClock::starting_at(start);
        let shared = clock.clone();
        clock.sleep(Duration::from_secs(90));
        assert_eq!(shared.now(), start + chrono::Duration::seconds(90));
        assert_eq!(shared.sleeps(), vec![Duration::from_secs(90)]);
    }

    #[test]
    fn frozen_clock_does_not_move() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap();
        let clock = VirtualClock::starting_at(start);
        clock.freeze();
        clock.sleep(Duration::from_secs(30));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.total_slept(), Duration::from_secs(30));
    }
}
