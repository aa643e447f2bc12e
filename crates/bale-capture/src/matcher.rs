//! Existing-unit matcher.
//!
//! Exact point lookup of a validated code against the replicated units. Not
//! finding a unit is a normal outcome: the bale may simply not have been
//! replicated yet.

use std::time::Duration;

use tracing::{debug, warn};

use bale_capture_core::{BaleCode, UnitReference};
use bale_capture_store::{Store, StoreError};

use crate::error::{CaptureError, Result};

/// Result of a unit lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Found(UnitReference),
    NotFound,
}

impl MatchOutcome {
    pub fn unit(&self) -> Option<&UnitReference> {
        match self {
            MatchOutcome::Found(unit) => Some(unit),
            MatchOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, MatchOutcome::Found(_))
    }
}

/// Bounded retry of store lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Looks up units by code in the local store.
#[derive(Clone)]
pub struct Matcher<S: Store> {
    store: S,
}

impl<S: Store> Matcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// One lookup, errors passed through.
    pub async fn lookup(&self, code: &BaleCode) -> std::result::Result<MatchOutcome, StoreError> {
        let outcome = match self.store.find_unit(code.as_str()).await? {
            Some(unit) => MatchOutcome::Found(unit),
            None => MatchOutcome::NotFound,
        };
        debug!(code = %code, found = outcome.is_found(), "unit_lookup");
        Ok(outcome)
    }

    /// Lookup with bounded retries on transient store failures.
    ///
    /// A non-transient failure stops retrying at once. Either way the failure
    /// comes back as `TransientStoreUnavailable` carrying the code.
    pub async fn lookup_with_retry(
        &self,
        code: &BaleCode,
        policy: &RetryPolicy,
    ) -> Result<MatchOutcome> {
        let max_attempts = policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.lookup(code).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(code = %code, attempt = attempt, error = %e, "unit_lookup_retry");
                    if !policy.backoff.is_zero() {
                        tokio::time::sleep(policy.backoff).await;
                    }
                }
                Err(e) => {
                    warn!(code = %code, attempts = attempt, error = %e, "unit_lookup_failed");
                    return Err(CaptureError::TransientStoreUnavailable {
                        code: code.clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}
