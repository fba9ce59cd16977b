//! Error types for job store operations.

use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Coarse cause of a database failure, kept so callers can log and match
/// without holding a `sqlx::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLITE_BUSY` / `SQLITE_LOCKED` outlasting the busy timeout.
    Busy,
    /// Unique, check or not-null constraint.
    Constraint,
    /// Pool closed or exhausted, or the file could not be reached.
    Unavailable,
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable
            }
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::ForeignKeyViolation => Self::Constraint,
                _ if is_busy_code(db.code().as_deref()) => Self::Busy,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

/// SQLite primary result codes 5 and 6, including extended variants.
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|code| code.parse::<u32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::Constraint => "constraint",
            Self::Unavailable => "unavailable",
            Self::Other => "other",
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error ({kind}): {message}")]
    Database {
        kind: StoreDbErrorKind,
        message: String,
    },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    AlreadyExists(String),

    /// A stored row could not be decoded into a job.
    #[error("corrupt job record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    #[must_use]
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_message_carries_kind() {
        let err = StoreError::Database {
            kind: StoreDbErrorKind::Busy,
            message: "database is locked".to_string(),
        };
        assert_eq!(err.to_string(), "database error (busy): database is locked");
        assert_eq!(err.database_kind(), Some(StoreDbErrorKind::Busy));
    }

    #[test]
    fn test_non_database_errors_have_no_kind() {
        assert_eq!(StoreError::NotFound("x".into()).database_kind(), None);
        assert_eq!(StoreError::corrupt("x", "bad").database_kind(), None);
    }

    #[test]
    fn test_corrupt_message_names_job() {
        let err = StoreError::corrupt("abc123", "invalid job status: paused");
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("paused"));
    }

    #[test]
    fn test_pool_closed_is_unavailable() {
        let err = StoreError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.database_kind(), Some(StoreDbErrorKind::Unavailable));
    }

    #[test]
    fn test_busy_codes_include_extended_variants() {
        assert!(is_busy_code(Some("5")));
        assert!(is_busy_code(Some("517")));
        assert!(is_busy_code(Some("6")));
        assert!(!is_busy_code(Some("19")));
        assert!(!is_busy_code(None));
    }
}
