//! Migration discovery
//!
//! A [`MigrationSource`] is one search root. [`SqlDirectorySource`] scans a
//! directory for `Migration{digits}.sql` files laid out as:
//!
//! ```sql
//! -- description: create users
//! -- +up
//! CREATE TABLE users (id INT NOT NULL);
//! -- +down
//! DROP TABLE users;
//! ```
//!
//! [`StaticSource`] holds migrations defined in code.

use super::error::MigrationError;
use super::migration::{Migration, SqlMigration};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A migration found by a source, with where it came from.
#[derive(Clone)]
pub struct DiscoveredMigration {
    pub name: String,
    pub source_location: String,
    /// SHA-256 of the file content; `None` for in-code migrations.
    pub checksum: Option<String>,
    pub migration: Rc<dyn Migration>,
}

impl std::fmt::Debug for DiscoveredMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredMigration")
            .field("name", &self.name)
            .field("source_location", &self.source_location)
            .field("checksum", &self.checksum)
            .field("description", &self.migration.description())
            .finish()
    }
}

/// One search root for migrations.
pub trait MigrationSource {
    /// Where this source looks, for error messages and [`MigrationInfo`](super::MigrationInfo).
    fn location(&self) -> String;

    /// Every migration this source provides.
    fn discover(&self) -> Result<Vec<DiscoveredMigration>, MigrationError>;
}

/// Ordering for migration names: numeric when both names are digits, so
/// `Migration9` sorts before `Migration10`.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// SHA-256 of migration file content, hex encoded.
#[must_use]
pub fn calculate_checksum(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Split migration file content into description, up and down SQL.
pub fn parse_sql_migration(content: &str, origin: &str) -> Result<SqlMigration, MigrationError> {
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let mut description = String::new();
    let mut section = Section::Preamble;
    let mut up: Option<Vec<&str>> = None;
    let mut down: Option<Vec<&str>> = None;

    for line in content.lines() {
        if let Some(directive) = line.trim().strip_prefix("--").map(str::trim) {
            if let Some(text) = directive.strip_prefix("description:") {
                description = text.trim().to_string();
                continue;
            }
            match directive {
                "+up" => {
                    section = Section::Up;
                    up.get_or_insert_with(Vec::new);
                    continue;
                }
                "+down" => {
                    section = Section::Down;
                    down.get_or_insert_with(Vec::new);
                    continue;
                }
                _ => {}
            }
        }
        match section {
            Section::Preamble => {}
            Section::Up => up.get_or_insert_with(Vec::new).push(line),
            Section::Down => down.get_or_insert_with(Vec::new).push(line),
        }
    }

    let up = up
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|sql| !sql.is_empty())
        .ok_or_else(|| MigrationError::InvalidSource(format!("{origin}: missing '-- +up' section")))?;
    let down = down
        .map(|lines| lines.join("\n").trim().to_string())
        .ok_or_else(|| MigrationError::InvalidSource(format!("{origin}: missing '-- +down' section")))?;

    Ok(SqlMigration::new(description, up, down))
}

/// Directory of `Migration{digits}.sql` files; the digits are the name.
#[derive(Debug, Clone)]
pub struct SqlDirectorySource {
    dir: PathBuf,
}

impl SqlDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for SqlDirectorySource {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn discover(&self) -> Result<Vec<DiscoveredMigration>, MigrationError> {
        if !self.dir.is_dir() {
            return Err(MigrationError::InvalidSource(format!(
                "Migrations directory does not exist: {}",
                self.dir.display()
            )));
        }

        let re = Regex::new(r"^Migration(\d+)\.sql$")
            .map_err(|e| MigrationError::InvalidSource(format!("Invalid regex: {e}")))?;
        let entries = fs::read_dir(&self.dir).map_err(|source| MigrationError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| re.captures(n))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };

            let content = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;
            let location = path.display().to_string();
            let migration = parse_sql_migration(&content, &location)?;

            migrations.push(DiscoveredMigration {
                name,
                source_location: location,
                checksum: Some(calculate_checksum(&content)),
                migration: Rc::new(migration),
            });
        }

        migrations.sort_by(|a, b| compare_names(&a.name, &b.name));
        Ok(migrations)
    }
}

/// Migrations registered in code.
///
/// # Example
///
/// ```
/// use quarry::migration::{MigrationSource, SqlMigration, StaticSource};
///
/// let source = StaticSource::new("app")
///     .with("0001", SqlMigration::new("users", "CREATE TABLE users (id INT)", "DROP TABLE users"));
/// assert_eq!(source.discover().unwrap()[0].name, "0001");
/// ```
#[derive(Clone)]
pub struct StaticSource {
    location: String,
    migrations: Vec<(String, Rc<dyn Migration>)>,
}

impl StaticSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            migrations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, migration: impl Migration + 'static) -> Self {
        self.migrations.push((name.into(), Rc::new(migration)));
        self
    }
}

impl std::fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSource")
            .field("location", &self.location)
            .field(
                "migrations",
                &self.migrations.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MigrationSource for StaticSource {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn discover(&self) -> Result<Vec<DiscoveredMigration>, MigrationError> {
        let mut migrations: Vec<DiscoveredMigration> = Vec::with_capacity(self.migrations.len());
        for (name, migration) in &self.migrations {
            if name.is_empty() {
                return Err(MigrationError::InvalidSource(format!(
                    "{}: migration with empty name",
                    self.location
                )));
            }
            if migrations.iter().any(|m| &m.name == name) {
                return Err(MigrationError::DuplicateMigration {
                    name: name.clone(),
                    first: self.location.clone(),
                    second: self.location.clone(),
                });
            }
            migrations.push(DiscoveredMigration {
                name: name.clone(),
                source_location: self.location.clone(),
                checksum: None,
                migration: Rc::clone(migration),
            });
        }
        migrations.sort_by(|a, b| compare_names(&a.name, &b.name));
        Ok(migrations)
    }
}
