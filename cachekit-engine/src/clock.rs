//! Monotonic UTC time source capability.

use chrono::{DateTime, Utc};

/// Abstract time source. `CacheEngine` is generic over this capability so tests can
/// supply a [`FixedClock`] instead of sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Current UTC instant, second resolution.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock `Clock`, backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic test double: always returns a value set by the test, advanced
/// explicitly with [`FixedClock::advance`].
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: std::sync::Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock();
        *guard += delta;
    }

    /// Set the clock to an exact instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_by_delta() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let t0 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now() >= t0);
    }
}
