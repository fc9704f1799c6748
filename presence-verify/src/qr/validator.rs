//! Token validation
//!
//! Accepted payloads look like `ATTENDANCE_<unixTimestampMs>_<nonce>` where
//! the nonce is non-empty ASCII alphanumeric. Anything else is a generic
//! "invalid code"; there is no lockout, the step stays retryable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Required payload prefix
pub const TOKEN_PREFIX: &str = "ATTENDANCE_";

/// Tokens stamped further than this into the future are treated as forged
const MAX_FUTURE_SKEW: Duration = Duration::from_secs(60);

/// Why a token was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrRejection {
    #[error("Invalid QR code. Please scan the attendance code displayed in class")]
    InvalidCode,

    #[error("This QR code has expired. Please scan the current code")]
    Expired,
}

/// Result of validating one payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrVerdict {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QrVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn reject(rejection: QrRejection) -> Self {
        Self {
            accepted: false,
            reason: Some(rejection.to_string()),
        }
    }
}

/// Validates decoded QR payloads
#[derive(Debug, Clone, Default)]
pub struct QrValidator {
    /// Freshness bound; `None` accepts any well-formed timestamp
    max_age: Option<Duration>,
}

impl QrValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: Option<Duration>) -> Self {
        Self { max_age }
    }

    /// Check shape, then freshness relative to `now`
    pub fn check(&self, token: &str, now: DateTime<Utc>) -> Result<(), QrRejection> {
        let issued_ms = parse_token(token).ok_or(QrRejection::InvalidCode)?;

        if let Some(max_age) = self.max_age {
            let age_ms = now.timestamp_millis() - issued_ms;
            let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
            let skew_ms = MAX_FUTURE_SKEW.as_millis() as i64;
            if age_ms > max_age_ms || age_ms < -skew_ms {
                return Err(QrRejection::Expired);
            }
        }

        Ok(())
    }

    /// Validate against the current time
    pub fn validate(&self, token: &str) -> QrVerdict {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> QrVerdict {
        match self.check(token, now) {
            Ok(()) => QrVerdict::accept(),
            Err(rejection) => QrVerdict::reject(rejection),
        }
    }
}

/// Extract the issue timestamp (ms) from a well-formed token
fn parse_token(token: &str) -> Option<i64> {
    let rest = token.trim().strip_prefix(TOKEN_PREFIX)?;
    let (timestamp, nonce) = rest.split_once('_')?;

    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if nonce.is_empty() || !nonce.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    timestamp.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_accepts_well_formed_token() {
        let verdict = QrValidator::new().validate("ATTENDANCE_1700000000000_ab12cd");
        assert!(verdict.accepted);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_rejects_junk() {
        let verdict = QrValidator::new().validate("RANDOM_JUNK");
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, Some(QrRejection::InvalidCode.to_string()));
    }

    #[test]
    fn test_rejects_malformed_variants() {
        let validator = QrValidator::new();
        for token in [
            "",
            "ATTENDANCE_",
            "ATTENDANCE_1700000000000",
            "ATTENDANCE_1700000000000_",
            "ATTENDANCE__ab12cd",
            "ATTENDANCE_17000x0000000_ab12cd",
            "ATTENDANCE_1700000000000_ab-12",
            "attendance_1700000000000_ab12cd",
            "https://example.com/ATTENDANCE_1700000000000_ab12cd",
        ] {
            assert!(!validator.validate(token).accepted, "accepted {:?}", token);
        }
    }

    #[test]
    fn test_surrounding_whitespace_tolerated() {
        assert!(QrValidator::new()
            .validate("  ATTENDANCE_1700000000000_ab12cd\n")
            .accepted);
    }

    #[test]
    fn test_freshness_bound() {
        let validator = QrValidator::with_max_age(Some(Duration::from_secs(300)));
        let issued = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let token = "ATTENDANCE_1700000000000_ab12cd";

        assert_eq!(validator.check(token, issued + chrono::Duration::seconds(120)), Ok(()));
        assert_eq!(
            validator.check(token, issued + chrono::Duration::seconds(301)),
            Err(QrRejection::Expired)
        );
        assert_eq!(
            validator.check(token, issued - chrono::Duration::seconds(120)),
            Err(QrRejection::Expired)
        );
    }

    #[test]
    fn test_shape_checked_before_freshness() {
        let validator = QrValidator::with_max_age(Some(Duration::from_secs(1)));
        assert_eq!(
            validator.check("RANDOM_JUNK", Utc::now()),
            Err(QrRejection::InvalidCode)
        );
    }
}
