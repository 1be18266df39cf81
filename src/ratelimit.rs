//! Leaky-bucket rate limiter for the batch engine.
//!
//! Each `take()` reserves the next free slot and sleeps until it arrives,
//! so K acquisitions at rate R are spaced over at least (K-1)/R seconds.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Request pacing for concurrent workers.
#[derive(Debug)]
pub enum RateLimiter {
    /// No pacing; `take()` returns immediately.
    Unlimited,
    /// At most `1/interval` acquisitions per second across all callers.
    PerSecond {
        interval: Duration,
        next_slot: Mutex<Option<Instant>>,
    },
}

impl RateLimiter {
    /// An unlimited limiter.
    pub fn unlimited() -> Self {
        Self::Unlimited
    }

    /// A limiter allowing `max_per_second` acquisitions per second.
    ///
    /// A zero rate is treated as unlimited.
    pub fn per_second(max_per_second: u32) -> Self {
        if max_per_second == 0 {
            return Self::Unlimited;
        }
        Self::PerSecond {
            interval: Duration::from_secs_f64(1.0 / f64::from(max_per_second)),
            next_slot: Mutex::new(None),
        }
    }

    /// Take one token, sleeping until the reserved slot arrives.
    pub async fn take(&self) {
        let Self::PerSecond {
            interval,
            next_slot,
        } = self
        else {
            return;
        };

        let slot = {
            let mut next = next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + *interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
