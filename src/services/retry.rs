// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Retry policy for campus API calls.
//!
//! The HTTP client consults the policy; business logic never sleeps itself.

use reqwest::StatusCode;
use std::time::Duration;

/// How many times, and after how long, a request is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after a 429 before giving up with `IntraRateLimited`.
    pub rate_limit_retries: u32,
    /// Retries after a network-level failure.
    pub transient_retries: u32,
    /// Delay (in `time_unit`s) when a 429 carries no usable Retry-After.
    pub fallback_units: u64,
    /// Fixed delay before retrying a network-level failure.
    pub transient_delay: Duration,
    /// Length of one Retry-After unit (one second against the real API).
    pub time_unit: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Double the rate-limit delay on each successive retry.
    pub exponential: bool,
}

impl RetryPolicy {
    /// Policy for paginated GETs: one retry after a 429, none otherwise.
    pub fn api(fallback: Duration) -> Self {
        Self {
            rate_limit_retries: 1,
            transient_retries: 0,
            fallback_units: fallback.as_secs().max(1),
            transient_delay: Duration::from_secs(1),
            time_unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential: false,
        }
    }

    /// Policy for the token exchange: a few bounded retries of each kind.
    pub fn token(fallback: Duration) -> Self {
        Self {
            rate_limit_retries: 3,
            transient_retries: 2,
            ..Self::api(fallback)
        }
    }

    /// Same policy measured in a different time unit. Tests use milliseconds.
    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.transient_delay = unit;
        self.time_unit = unit;
        self.max_delay = unit * 60;
        self
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Delay before retry number `attempt` (0-based) after a 429.
    pub fn rate_limit_delay(&self, retry_after: Option<&str>, attempt: u32) -> Duration {
        let units = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.fallback_units);
        let base = self.time_unit.saturating_mul(units.min(u32::MAX as u64) as u32);
        let scaled = if self.exponential {
            base.saturating_mul(2u32.saturating_pow(attempt))
        } else {
            base
        };
        scaled.min(self.max_delay)
    }

    /// Delay before retrying a network-level failure.
    pub fn transient_delay(&self) -> Duration {
        self.transient_delay.min(self.max_delay)
    }
}

/// Retry-After value from a response, if present and valid UTF-8.
pub fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
