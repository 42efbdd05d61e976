//! Per-IP throttle for failed authentication attempts.
//!
//! Failures are drawn from a keyed `governor` limiter. While an address has
//! quota left nothing happens; the failure that finds the quota exhausted
//! blocks the address until the limiter would admit it again. Checking an
//! address only looks at the block list, so successful attempts never use
//! up the failure budget.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::warn;

use crate::metrics;

type FailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key used when the client IP is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct LoginThrottle {
    /// `None` = throttling disabled
    inner: Option<Arc<ThrottleState>>,
}

struct ThrottleState {
    failures: FailureLimiter,
    blocked_until: Mutex<HashMap<String, Instant>>,
}

impl LoginThrottle {
    /// Allow `failures_per_minute` failed attempts per IP; 0 disables the throttle.
    pub fn new(failures_per_minute: u32) -> Self {
        let inner = NonZeroU32::new(failures_per_minute).map(|limit| {
            let quota = Quota::per_minute(limit).allow_burst(limit);
            Arc::new(ThrottleState {
                failures: RateLimiter::keyed(quota),
                blocked_until: Mutex::new(HashMap::new()),
            })
        });
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Check whether `client_ip` may attempt to authenticate.
    ///
    /// Does not consume any quota. Returns the number of seconds to wait
    /// when the address is blocked.
    pub fn check(&self, client_ip: Option<&str>) -> Result<(), u64> {
        let Some(state) = &self.inner else {
            return Ok(());
        };
        let key = client_ip.unwrap_or(UNKNOWN_CLIENT);

        let mut blocked = state
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match blocked.get(key) {
            Some(until) if *until > now => {
                let retry_after = seconds_until(*until, now);
                metrics::record_login_throttled();
                Err(retry_after)
            }
            Some(_) => {
                blocked.remove(key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record a failed authentication for `client_ip`.
    ///
    /// Returns the number of seconds to wait when this failure exhausted
    /// the address's budget; the address is blocked from then on.
    pub fn record_failure(&self, client_ip: Option<&str>) -> Result<(), u64> {
        let Some(state) = &self.inner else {
            return Ok(());
        };
        let key = client_ip.unwrap_or(UNKNOWN_CLIENT).to_string();

        let Err(not_until) = state.failures.check_key(&key) else {
            return Ok(());
        };

        let wait = not_until
            .wait_time_from(DefaultClock::default().now())
            .max(Duration::from_secs(1));
        let now = Instant::now();
        let until = now + wait;
        let retry_after = seconds_until(until, now);

        warn!(
            client_ip = %key,
            retry_after_secs = retry_after,
            "IP blocked due to excessive authentication failures"
        );
        metrics::record_login_throttled();

        let mut blocked = state
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        blocked.retain(|_, until| *until > now);
        blocked.insert(key, until);

        Err(retry_after)
    }
}

fn seconds_until(until: Instant, now: Instant) -> u64 {
    let remaining = until.saturating_duration_since(now);
    // Round up so clients never retry early
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

impl std::fmt::Debug for LoginThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginThrottle")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
