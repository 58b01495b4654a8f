//! Migration trait definition

/// One forward/backward schema change.
///
/// `up` and `down` return the SQL to run; the manager executes it and keeps
/// the tracking table in step inside the same transaction.
pub trait Migration {
    /// Human-readable summary stored in the tracking table.
    fn description(&self) -> &str;

    /// SQL applying the change.
    fn up(&self) -> String;

    /// SQL reverting the change.
    fn down(&self) -> String;
}

/// Migration backed by literal SQL, as read from a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    description: String,
    up: String,
    down: String,
}

impl SqlMigration {
    pub fn new(description: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

impl Migration for SqlMigration {
    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self) -> String {
        self.up.clone()
    }

    fn down(&self) -> String {
        self.down.clone()
    }
}
