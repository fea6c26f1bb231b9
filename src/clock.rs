//! Wall-clock access behind a trait so position estimation and staleness
//! checks can run on virtual time in tests.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_unix_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Test clock that only moves when told to.
    #[derive(Clone, Default)]
    pub(crate) struct ManualClock {
        now: Arc<AtomicI64>,
    }

    impl ManualClock {
        pub(crate) fn at(now_unix_millis: i64) -> Self {
            let clock = Self::default();
            clock.set(now_unix_millis);
            clock
        }

        pub(crate) fn set(&self, now_unix_millis: i64) {
            self.now.store(now_unix_millis, Ordering::SeqCst);
        }

        pub(crate) fn advance(&self, millis: i64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_unix_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
