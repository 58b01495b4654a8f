//! Error types shared by every layer of the crate.
//!
//! Failures are never swallowed: each path either returns a typed
//! [`QuarryError`] or propagates the driver's [`ExecuteError`] unchanged.

use std::fmt;

/// SQLSTATE reported by MySQL when a table or view does not exist.
pub const MYSQL_TABLE_NOT_FOUND: &str = "42S02";
/// SQLSTATE reported by PostgreSQL for `undefined_table`.
pub const POSTGRES_UNDEFINED_TABLE: &str = "42P01";
/// SQLSTATE for serialization failures (MySQL reports deadlocks with it).
pub const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE reported by PostgreSQL for a detected deadlock.
pub const POSTGRES_DEADLOCK: &str = "40P01";

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// Missing cipher key, unknown filter action, malformed relation, bad metadata.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Authentication of a ciphered payload failed.
    #[error("Integrity error: {0}")]
    Integrity(String),
    /// Metadata cache miss or unknown lookup key.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Operation not valid in the current state.
    #[error("State error: {0}")]
    State(String),
    /// A value did not have the shape a transformer or entity expected.
    #[error("Conversion error: {0}")]
    Conversion(String),
    /// Error reported by the database client.
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

impl QuarryError {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }
}

/// Error raised while executing a statement.
///
/// Carries the SQLSTATE code when the driver reports one so callers can decide
/// whether a retry makes sense (see [`ExecuteError::is_deadlock`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteError {
    code: Option<String>,
    message: String,
}

impl ExecuteError {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_owned),
            message: message.into(),
        }
    }

    /// Error without a SQLSTATE (connection loss, client-side failures).
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` when the statement referenced a table that does not exist.
    #[must_use]
    pub fn is_table_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some(MYSQL_TABLE_NOT_FOUND | POSTGRES_UNDEFINED_TABLE)
        )
    }

    /// `true` for deadlock / serialization failures that a caller may retry.
    #[must_use]
    pub fn is_deadlock(&self) -> bool {
        matches!(self.code(), Some(SERIALIZATION_FAILURE | POSTGRES_DEADLOCK))
    }
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "Execute error [{code}]: {}", self.message),
            None => write!(f, "Execute error: {}", self.message),
        }
    }
}

impl std::error::Error for ExecuteError {}

pub type Result<T, E = QuarryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_not_found_codes() {
        assert!(ExecuteError::new(Some("42S02"), "missing").is_table_not_found());
        assert!(ExecuteError::new(Some("42P01"), "missing").is_table_not_found());
        assert!(!ExecuteError::new(Some("23000"), "dup").is_table_not_found());
        assert!(!ExecuteError::other("gone").is_table_not_found());
    }

    #[test]
    fn test_deadlock_codes() {
        assert!(ExecuteError::new(Some("40001"), "deadlock").is_deadlock());
        assert!(ExecuteError::new(Some("40P01"), "deadlock").is_deadlock());
        assert!(!ExecuteError::new(Some("42S02"), "x").is_deadlock());
    }

    #[test]
    fn test_display_includes_code() {
        let err = ExecuteError::new(Some("42S02"), "Table 'migrations' doesn't exist");
        assert_eq!(
            err.to_string(),
            "Execute error [42S02]: Table 'migrations' doesn't exist"
        );
        let wrapped: QuarryError = err.into();
        assert!(wrapped.to_string().contains("42S02"));
    }
}
