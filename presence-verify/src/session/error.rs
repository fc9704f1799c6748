//! Session-level errors
//!
//! Step failures (bad QR, outside geofence, camera trouble) are not errors
//! here: they are recorded on the session as status text and the step stays
//! retryable. These errors are misuse of the workflow itself.

use super::{Check, VerificationStep};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No verification session is open")]
    NoActiveSession,

    #[error("A verification session is already open ({0})")]
    AlreadyActive(Uuid),

    #[error("Invalid attendance policy: {0}")]
    InvalidPolicy(String),

    #[error("Step {actual} is active; this action belongs to step {expected}")]
    WrongStep {
        expected: VerificationStep,
        actual: VerificationStep,
    },

    #[error("Cannot leave step {step}: {} not verified", describe(.missing))]
    StepIncomplete {
        step: VerificationStep,
        missing: Vec<Check>,
    },

    #[error("Cannot go back from {from} to {to}")]
    CannotGoBack {
        from: VerificationStep,
        to: VerificationStep,
    },

    #[error("Already at the final step")]
    AtFinalStep,

    #[error("Submission blocked: {} not verified", describe(.missing))]
    SubmitBlocked { missing: Vec<Check> },

    #[error("Result belongs to a session or attempt that is no longer current ({0})")]
    Stale(Uuid),
}

fn describe(missing: &[Check]) -> String {
    missing
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_blocked_lists_missing_checks() {
        let err = SessionError::SubmitBlocked {
            missing: vec![Check::Location, Check::Time],
        };
        assert_eq!(
            err.to_string(),
            "Submission blocked: location, time window not verified"
        );
    }
}
