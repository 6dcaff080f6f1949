//! Sliding-window rate limiting per service.
//!
//! Each service keeps the timestamps of its accepted requests. A request is
//! admitted only if every configured window (second, minute, hour, day) still
//! has room; denied attempts are never recorded. The limiter never waits:
//! callers surface a `RATE_LIMIT_EXCEEDED` error instead.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{ServiceId, ValidationError};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Optional request ceilings for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub per_second: Option<u32>,
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

impl RateLimitConfig {
    /// No ceilings at all.
    pub const fn unlimited() -> Self {
        Self {
            per_second: None,
            per_minute: None,
            per_hour: None,
            per_day: None,
        }
    }

    pub const fn per_minute(limit: u32) -> Self {
        Self {
            per_minute: Some(limit),
            ..Self::unlimited()
        }
    }

    /// Published limits of the upstream providers.
    pub const fn default_for(service: ServiceId) -> Self {
        match service {
            ServiceId::Listings => Self {
                per_second: None,
                per_minute: Some(60),
                per_hour: Some(1_000),
                per_day: Some(10_000),
            },
            ServiceId::Valuation => Self {
                per_second: Some(2),
                per_minute: None,
                per_hour: None,
                per_day: Some(1_000),
            },
            ServiceId::PublicRecords => Self {
                per_second: None,
                per_minute: Some(30),
                per_hour: None,
                per_day: Some(5_000),
            },
            ServiceId::Demographics => Self::per_minute(60),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, ceiling) in [
            ("perSecond", self.per_second),
            ("perMinute", self.per_minute),
            ("perHour", self.per_hour),
            ("perDay", self.per_day),
        ] {
            if ceiling == Some(0) {
                return Err(ValidationError::ZeroRateLimit { window: name });
            }
        }
        Ok(())
    }

    fn ceilings(&self) -> impl Iterator<Item = (Duration, u32)> {
        [
            (SECOND, self.per_second),
            (MINUTE, self.per_minute),
            (HOUR, self.per_hour),
            (DAY, self.per_day),
        ]
        .into_iter()
        .filter_map(|(window, ceiling)| ceiling.map(|ceiling| (window, ceiling)))
    }

    fn largest_window(&self) -> Option<Duration> {
        self.ceilings().map(|(window, _)| window).max()
    }
}

/// Unused capacity per configured window; `None` where no ceiling is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRemaining {
    pub per_second: Option<u32>,
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

impl RateLimitRemaining {
    pub fn is_exhausted(&self) -> bool {
        [self.per_second, self.per_minute, self.per_hour, self.per_day]
            .into_iter()
            .any(|slack| slack == Some(0))
    }
}

/// Process-wide sliding-window limiter keyed by service.
#[derive(Debug, Default)]
pub struct RateLimiter {
    history: Mutex<HashMap<ServiceId, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_history(&self) -> MutexGuard<'_, HashMap<ServiceId, VecDeque<Instant>>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter history mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Admits and records one request if every configured window has room.
    pub fn can_proceed(&self, service: ServiceId, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        let mut history = self.lock_history();
        let accepted = history.entry(service).or_default();

        let Some(largest) = config.largest_window() else {
            accepted.clear();
            return true;
        };
        prune(accepted, now, largest);

        for (window, ceiling) in config.ceilings() {
            let used = count_within(accepted, now, window);
            if used >= ceiling as usize {
                debug!(
                    service = service.as_str(),
                    window_secs = window.as_secs(),
                    ceiling,
                    "rate limit reached; denying request"
                );
                return false;
            }
        }

        accepted.push_back(now);
        true
    }

    /// Slack left in each configured window, without recording anything.
    pub fn remaining(&self, service: ServiceId, config: &RateLimitConfig) -> RateLimitRemaining {
        let now = Instant::now();
        let history = self.lock_history();
        let empty = VecDeque::new();
        let accepted = history.get(&service).unwrap_or(&empty);

        let slack = |window: Duration, ceiling: Option<u32>| {
            ceiling.map(|ceiling| {
                let used = count_within(accepted, now, window);
                ceiling.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
            })
        };

        RateLimitRemaining {
            per_second: slack(SECOND, config.per_second),
            per_minute: slack(MINUTE, config.per_minute),
            per_hour: slack(HOUR, config.per_hour),
            per_day: slack(DAY, config.per_day),
        }
    }

    pub fn reset(&self, service: ServiceId) {
        self.lock_history().remove(&service);
    }
}

fn prune(accepted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while accepted
        .front()
        .is_some_and(|at| now.duration_since(*at) >= window)
    {
        accepted.pop_front();
    }
}

fn count_within(accepted: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    accepted
        .iter()
        .rev()
        .take_while(|at| now.duration_since(**at) < window)
        .count()
}
