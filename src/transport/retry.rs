//! Response classification and retry budget.

use std::time::Duration;

use crate::error::Violation;

/// What the caller expects the counterparty to answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpectedOutcome {
    /// A 2xx response
    #[default]
    Success,
    /// A 4xx or 5xx response (negative test)
    Error,
}

/// Verdict for one HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The response matches the expected outcome
    Accepted,
    /// Client error other than 404 while success was expected; retry
    Transient,
    /// The response contradicts the expected outcome
    Violation(Violation),
}

/// Classify a status code against the expected outcome.
///
/// | Expected  | 2xx                  | 404               | other 4xx   | 5xx / other         |
/// |-----------|----------------------|-------------------|-------------|---------------------|
/// | `Success` | accepted             | unexpected 404    | transient   | unexpected status   |
/// | `Error`   | missing error        | accepted          | accepted    | 5xx accepted, other unexpected |
pub fn classify(status: u16, expected: ExpectedOutcome) -> Classification {
    let success = (200..300).contains(&status);
    let client_error = (400..500).contains(&status);
    let server_error = (500..600).contains(&status);

    match expected {
        ExpectedOutcome::Success if success => Classification::Accepted,
        ExpectedOutcome::Success if status == 404 => {
            Classification::Violation(Violation::UnexpectedNotFound)
        },
        ExpectedOutcome::Success if client_error => Classification::Transient,
        ExpectedOutcome::Success => Classification::Violation(Violation::UnexpectedStatus(status)),
        ExpectedOutcome::Error if client_error || server_error => Classification::Accepted,
        ExpectedOutcome::Error if success => {
            Classification::Violation(Violation::MissingExpectedError)
        },
        ExpectedOutcome::Error => Classification::Violation(Violation::UnexpectedStatus(status)),
    }
}

/// Bounded exponential backoff for transient responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the first call and is at least 1.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts including the first call
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the first retry
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Backoff after the given failed attempt (1-based): initial, 2x, 4x, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sum of all backoffs when every attempt fails transiently.
    pub fn max_total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.backoff(attempt)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_expecting_success() {
        let expected = ExpectedOutcome::Success;
        assert_eq!(classify(200, expected), Classification::Accepted);
        assert_eq!(classify(204, expected), Classification::Accepted);
        assert_eq!(
            classify(404, expected),
            Classification::Violation(Violation::UnexpectedNotFound)
        );
        assert_eq!(classify(400, expected), Classification::Transient);
        assert_eq!(classify(429, expected), Classification::Transient);
        assert_eq!(
            classify(500, expected),
            Classification::Violation(Violation::UnexpectedStatus(500))
        );
        assert_eq!(
            classify(302, expected),
            Classification::Violation(Violation::UnexpectedStatus(302))
        );
    }

    #[test]
    fn test_classify_expecting_error() {
        let expected = ExpectedOutcome::Error;
        assert_eq!(classify(400, expected), Classification::Accepted);
        // A 404 is what a negative test usually wants
        assert_eq!(classify(404, expected), Classification::Accepted);
        assert_eq!(classify(503, expected), Classification::Accepted);
        assert_eq!(
            classify(200, expected),
            Classification::Violation(Violation::MissingExpectedError)
        );
        assert_eq!(
            classify(301, expected),
            Classification::Violation(Violation::UnexpectedStatus(301))
        );
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.max_total_backoff(), Duration::from_millis(600));
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1));
        assert_eq!(RetryPolicy::none().max_total_backoff(), Duration::ZERO);
    }
}
