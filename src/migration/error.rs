//! Migration-specific error types

use crate::error::QuarryError;
use std::path::PathBuf;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// No discovered migration carries this name.
    #[error("Migration {0} not found")]
    UnknownMigration(String),
    #[error("Migration {0} already applied")]
    AlreadyApplied(String),
    #[error("Migration {0} not applied")]
    NotApplied(String),
    /// Two search roots yielded the same name.
    #[error("Migration {name} is defined in both {first} and {second}")]
    DuplicateMigration {
        name: String,
        first: String,
        second: String,
    },
    /// A search root or a migration file could not be understood.
    #[error("Invalid migration source: {0}")]
    InvalidSource(String),
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] QuarryError),
}

impl MigrationError {
    /// `true` for the errors raised by a migration being in the wrong state.
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_) | Self::NotApplied(_))
    }

    /// `true` when the named migration does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownMigration(_))
    }
}
