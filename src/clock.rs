//! Clock abstraction so timers and soft-lock TTLs are testable.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source used by the scheduler and soft locks.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for `duration`, then return. Fires once.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub mod test_support {
    //! Manually driven clock for tests.

    use std::sync::Mutex;

    use super::*;

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn at(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, duration: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(duration).unwrap();
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, _duration: Duration) {
            // Tests drive time with `advance`; sleeping is a no-op so timer
            // tasks never block the test runtime.
        }
    }
}
