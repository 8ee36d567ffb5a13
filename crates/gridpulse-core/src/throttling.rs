use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-source outbound request budget.
///
/// The full minute's budget is available as a burst and refills continuously. Exhausting
/// it makes the source sit out the cycle; nothing is queued.
pub struct RequestQuota {
    per_minute: NonZeroU32,
    limiter: DirectRateLimiter,
}

impl RequestQuota {
    pub fn per_minute(requests: NonZeroU32) -> Self {
        Self {
            per_minute: requests,
            limiter: RateLimiter::direct(Quota::per_minute(requests)),
        }
    }

    /// Builds a quota when a limit is configured; zero or absent means unlimited.
    pub fn from_limit(requests_per_minute: Option<u32>) -> Option<Self> {
        requests_per_minute
            .and_then(NonZeroU32::new)
            .map(Self::per_minute)
    }

    /// Consumes one request from the budget when available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.per_minute.get()
    }
}

impl Debug for RequestQuota {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQuota")
            .field("per_minute", &self.per_minute)
            .finish_non_exhaustive()
    }
}
