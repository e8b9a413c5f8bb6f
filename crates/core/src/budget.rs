//! Request-count and wall-clock limits of one crawl session.
//!
//! The enforcer is consulted on every scheduling event of the session's job.
//! It never does I/O and takes the current time as an argument, so the
//! session decides when "now" is.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::CloseReason;

/// Limits bounding one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Scheduling events allowed before the job is closed.
    pub max_requests: Option<u32>,
    pub timeout: Duration,
}

impl Budget {
    pub fn new(max_requests: Option<u32>, timeout: Duration) -> Self {
        Self {
            max_requests,
            timeout,
        }
    }
}

/// Tracks a [`Budget`] against the scheduling events of one job run.
#[derive(Debug, Clone)]
pub struct BudgetEnforcer {
    budget: Budget,
    started: Instant,
    scheduled_count: u32,
}

impl BudgetEnforcer {
    pub fn new(budget: Budget, started: Instant) -> Self {
        Self {
            budget,
            started,
            scheduled_count: 0,
        }
    }

    pub fn scheduled_count(&self) -> u32 {
        self.scheduled_count
    }

    /// Count one scheduling event.
    ///
    /// With `max_requests = N` this returns a close reason on the (N+1)-th
    /// call and on every call after it.
    pub fn on_request_scheduled(&mut self) -> Option<CloseReason> {
        match self.budget.max_requests {
            Some(max) if self.scheduled_count >= max => Some(CloseReason::RequestBudgetExceeded),
            _ => {
                self.scheduled_count = self.scheduled_count.saturating_add(1);
                None
            }
        }
    }

    /// Check the wall-clock budget at `now`.
    pub fn on_tick(&self, now: Instant) -> Option<CloseReason> {
        if now.saturating_duration_since(self.started) >= self.budget.timeout {
            Some(CloseReason::Timeout)
        } else {
            None
        }
    }
}

/// Parse a caller-supplied `max_requests` value.
///
/// Accepts a non-negative integer, as a JSON number or a numeric string.
/// `null` means no limit.
pub fn parse_max_requests(value: &Value) -> Result<Option<u32>, String> {
    let invalid = || format!("Invalid max_requests value: {}", value);
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(invalid),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enforcer(max_requests: Option<u32>, timeout_secs: u64) -> (BudgetEnforcer, Instant) {
        let start = Instant::now();
        (
            BudgetEnforcer::new(
                Budget::new(max_requests, Duration::from_secs(timeout_secs)),
                start,
            ),
            start,
        )
    }

    #[test]
    fn test_closes_exactly_on_n_plus_one() {
        for n in 0..5u32 {
            let (mut budget, _) = enforcer(Some(n), 60);
            for _ in 0..n {
                assert_eq!(budget.on_request_scheduled(), None);
            }
            assert_eq!(
                budget.on_request_scheduled(),
                Some(CloseReason::RequestBudgetExceeded),
                "max_requests = {}",
                n
            );
            assert_eq!(budget.scheduled_count(), n);
        }
    }

    #[test]
    fn test_zero_budget_closes_on_first_event() {
        let (mut budget, _) = enforcer(Some(0), 60);
        assert_eq!(
            budget.on_request_scheduled(),
            Some(CloseReason::RequestBudgetExceeded)
        );
    }

    #[test]
    fn test_no_limit_never_closes() {
        let (mut budget, _) = enforcer(None, 60);
        for _ in 0..1000 {
            assert_eq!(budget.on_request_scheduled(), None);
        }
        assert_eq!(budget.scheduled_count(), 1000);
    }

    #[test]
    fn test_timeout_boundary() {
        let (budget, start) = enforcer(None, 1);
        assert_eq!(budget.on_tick(start), None);
        assert_eq!(budget.on_tick(start + Duration::from_millis(999)), None);
        assert_eq!(
            budget.on_tick(start + Duration::from_secs(1)),
            Some(CloseReason::Timeout)
        );
        assert_eq!(
            budget.on_tick(start + Duration::from_secs(5)),
            Some(CloseReason::Timeout)
        );
    }

    #[test]
    fn test_parse_max_requests() {
        assert_eq!(parse_max_requests(&json!(null)), Ok(None));
        assert_eq!(parse_max_requests(&json!(3)), Ok(Some(3)));
        assert_eq!(parse_max_requests(&json!("7")), Ok(Some(7)));
        assert_eq!(parse_max_requests(&json!(" 0 ")), Ok(Some(0)));
        assert!(parse_max_requests(&json!("foo")).is_err());
        assert!(parse_max_requests(&json!(-1)).is_err());
        assert!(parse_max_requests(&json!(1.5)).is_err());
        assert!(parse_max_requests(&json!([1])).is_err());
    }
}
