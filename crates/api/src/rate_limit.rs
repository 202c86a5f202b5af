//! Per-route quota tracking.
//!
//! Calls that hit the same endpoint shape share quota state regardless of
//! which resource id was used, so bucket keys are built from the method plus
//! the path with identifier-looking segments replaced by a placeholder.
//! Nothing here persists across process restarts.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::transport::ApiResponse;

/// Quota state for one normalized route.
#[derive(Debug, Clone, Default)]
pub struct RouteBucket {
    pub remaining: i64,
    /// Reset time as epoch seconds, straight from the quota headers.
    pub reset_at: f64,
    pub bucket_hash: Option<String>,
}

/// Bucket map plus the process-wide global deadline. Owned exclusively by
/// one client instance; callers that need cross-task coordination share the
/// client.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<String, RouteBucket>,
    global_until: Option<Instant>,
}

pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl RateLimiter {
    /// How long the next request on `route` must wait, if at all. The global
    /// deadline wins over route-local state.
    pub fn delay_before(&self, route: &str) -> Option<Duration> {
        if let Some(until) = self.global_until {
            let now = Instant::now();
            if until > now {
                return Some(until - now);
            }
        }
        let bucket = self.buckets.get(route)?;
        if bucket.remaining > 0 {
            return None;
        }
        let wait = bucket.reset_at - now_epoch();
        (wait > 0.0).then(|| Duration::from_secs_f64(wait))
    }

    /// Update the route's bucket from a response's quota headers, when present.
    pub fn record(&mut self, route: &str, response: &ApiResponse) {
        let remaining = response
            .header("x-ratelimit-remaining")
            .and_then(|v| v.parse::<i64>().ok());
        let reset_at = response
            .header("x-ratelimit-reset")
            .and_then(|v| v.parse::<f64>().ok());
        if remaining.is_none() && reset_at.is_none() {
            return;
        }

        let bucket = self.buckets.entry(route.to_string()).or_default();
        if let Some(remaining) = remaining {
            bucket.remaining = remaining;
        }
        if let Some(reset_at) = reset_at {
            bucket.reset_at = reset_at;
        }
        if let Some(hash) = response.header("x-ratelimit-bucket") {
            bucket.bucket_hash = Some(hash.to_string());
        }
        debug!(
            route,
            remaining = bucket.remaining,
            reset_at = bucket.reset_at,
            "bucket updated"
        );
    }

    /// Note a 429. A global limit sets the process-wide deadline; otherwise
    /// only this route is exhausted until `retry_after` passes.
    pub fn note_rate_limited(&mut self, route: &str, retry_after: f64, global: bool) {
        let retry_after = retry_after.max(0.0);
        if global {
            self.global_until = Some(Instant::now() + Duration::from_secs_f64(retry_after));
            debug!(retry_after, "global rate limit engaged");
            return;
        }
        let bucket = self.buckets.entry(route.to_string()).or_default();
        bucket.remaining = 0;
        bucket.reset_at = now_epoch() + retry_after;
    }

    #[cfg(test)]
    pub(crate) fn set_bucket(&mut self, route: &str, bucket: RouteBucket) {
        self.buckets.insert(route.to_string(), bucket);
    }

    #[cfg(test)]
    pub(crate) fn set_global_deadline(&mut self, until: Instant) {
        self.global_until = Some(until);
    }
}

/// Bucket key for a request: method plus the path with identifier segments
/// replaced by `{id}`. Query strings never participate.
pub fn normalize_route(method: &str, path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let normalized: Vec<&str> = path
        .split('/')
        .map(|seg| if is_identifier(seg) { "{id}" } else { seg })
        .collect();
    format!("{} {}", method.to_ascii_uppercase(), normalized.join("/"))
}

fn is_identifier(seg: &str) -> bool {
    if seg.len() >= 5 && seg.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    seg.len() >= 16
        && seg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && seg.bytes().any(|b| b.is_ascii_digit())
}
