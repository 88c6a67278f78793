// =============================================================================
// StorageError — typed classification for the retry wrapper (spec.md §5, §9)
// =============================================================================
//
// Grounded in `common/database/database_basic.py`'s exception handling: a
// keyword match against the driver error text (connection/broken/lost/
// timeout/reset/"gone away"/"packet sequence") classifies network errors,
// while MySQL error code 1213 classifies deadlocks. Everything else is
// non-transient and propagates without retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transient network error: {0}")]
    Network(String),

    #[error("deadlock detected (MySQL error 1213): {0}")]
    Deadlock(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("analytical store error: {0}")]
    Analytical(#[from] clickhouse::error::Error),

    #[error("not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// Network-error keywords observed in the original pymysql-based retry
/// wrapper. Matched case-insensitively against the lowered error message.
const NETWORK_ERROR_KEYWORDS: &[&str] = &[
    "connection",
    "broken",
    "lost",
    "timeout",
    "reset",
    "gone away",
    "operationalerror",
    "interfaceerror",
    "packet sequence",
    "internalerror",
];

/// MySQL's deadlock-found-when-trying-to-get-lock error code.
const MYSQL_DEADLOCK_ERROR_CODE: u32 = 1213;

impl StorageError {
    /// Classify a raw `sqlx::Error` into `Network`/`Deadlock`/non-transient,
    /// matching the source's keyword-and-errno classification.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(code) = db_err.code() {
                if code.as_ref() == MYSQL_DEADLOCK_ERROR_CODE.to_string() {
                    return Self::Deadlock(db_err.message().to_string());
                }
            }
        }

        let message = err.to_string();
        let lower = message.to_lowercase();
        if NETWORK_ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Self::Network(message);
        }

        Self::Database(err)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Deadlock(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_keyword_detection() {
        for kw in NETWORK_ERROR_KEYWORDS {
            assert!(kw.to_lowercase().contains(kw));
        }
    }

    #[test]
    fn non_transient_error_is_not_transient() {
        let err = StorageError::Constraint("unique violation".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn network_and_deadlock_are_transient() {
        assert!(StorageError::Network("connection reset by peer".into()).is_transient());
        assert!(StorageError::Deadlock("1213".into()).is_transient());
    }
}
