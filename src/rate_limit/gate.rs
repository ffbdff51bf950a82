//! Access Gate
//!
//! Decides whether an upstream call may proceed. The minute window is checked
//! first and consumes a slot on success; the monthly budget is then read. A
//! call that the budget rejects still holds its window slot.

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::budget::PeriodBudget;
use super::window::SlidingWindowLimiter;
use crate::metrics;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Why an attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Minute window is full
    RateLimited { retry_after_secs: u64 },

    /// Monthly budget is spent
    BudgetExhausted { used: i64, limit: i64 },
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed
    Allowed,

    /// The call must not reach upstream
    Denied(DenialReason),
}

impl Admission {
    /// Whether the call may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// Outcome label for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Admission::Allowed => "allowed",
            Admission::Denied(DenialReason::RateLimited { .. }) => "rate_limited",
            Admission::Denied(DenialReason::BudgetExhausted { .. }) => "budget_exhausted",
        }
    }
}

/// Combined minute-window and monthly-budget gate
#[derive(Debug, Clone)]
pub struct AccessGate {
    limiter: Arc<SlidingWindowLimiter>,
    budget: Arc<PeriodBudget>,
    retry: RetryConfig,
}

impl AccessGate {
    /// Create a gate over `limiter` and `budget`
    pub fn new(limiter: SlidingWindowLimiter, budget: PeriodBudget) -> Self {
        Self {
            limiter: Arc::new(limiter),
            budget: Arc::new(budget),
            retry: RetryConfig::default(),
        }
    }

    /// Use a different retry policy for budget increments
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Minute-window limiter
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// Monthly budget
    pub fn budget(&self) -> &PeriodBudget {
        &self.budget
    }

    /// Check whether a call at `now` (Unix seconds) may proceed
    ///
    /// When the budget cannot be read the call is admitted and a warning is
    /// logged; an unreachable store should not take the service down.
    pub async fn try_admit(&self, now: u64) -> Admission {
        let admission = self.decide(now).await;
        metrics::record_admission(admission.outcome());
        admission
    }

    async fn decide(&self, now: u64) -> Admission {
        if !self.limiter.try_admit(now) {
            let retry_after_secs = self.limiter.seconds_until_next_slot(now);
            warn!(retry_after_secs, "Minute rate limit reached");
            return Admission::Denied(DenialReason::RateLimited { retry_after_secs });
        }

        let limit = self.budget.limit();
        match self.budget.current_usage().await {
            Ok(used) if used >= limit => {
                warn!(used, limit, "Monthly API budget exhausted");
                Admission::Denied(DenialReason::BudgetExhausted { used, limit })
            }
            Ok(used) => {
                debug!(used, limit, "Admitted upstream call");
                Admission::Allowed
            }
            Err(e) => {
                warn!(error = %e, "Failed to read monthly usage, admitting without budget check");
                Admission::Allowed
            }
        }
    }

    /// Count a successful upstream call against the monthly budget
    ///
    /// Retries transient store failures. Never fails the caller: returns
    /// `false` after logging when the increment could not be recorded.
    pub async fn record_success(&self) -> bool {
        let budget = Arc::clone(&self.budget);
        let result = retry_with_backoff(&self.retry, || {
            let budget = Arc::clone(&budget);
            async move { budget.increment().await }
        })
        .await;

        match result {
            Ok(used) => {
                metrics::MONTHLY_USAGE.set(used);
                debug!(used, limit = self.budget.limit(), "Recorded upstream call");
                true
            }
            Err(e) => {
                metrics::BUDGET_WRITE_FAILURES_TOTAL.inc();
                error!(
                    error = %e,
                    key = %self.budget.current_key(),
                    "Failed to record upstream call against monthly budget"
                );
                false
            }
        }
    }
}
