//! Applying and reverting migrations against the tracking table.

use super::error::MigrationError;
use super::migration::Migration;
use super::source::{compare_names, DiscoveredMigration, MigrationSource, SqlDirectorySource};
use super::state_table::{create_state_table_sql, delete_applied_sql, insert_applied_sql, select_applied_sql};
use crate::config::QuarryConfig;
use crate::db::{transaction, DbClient, Params};
use crate::error::QuarryError;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// Default tracking table name.
pub const DEFAULT_TABLE: &str = "migrations";

/// State of one discovered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationInfo {
    pub name: String,
    pub source_location: String,
    pub description: String,
    pub checksum: Option<String>,
    /// A row with this name exists in the tracking table.
    pub migrated: bool,
}

/// Discovered migrations keyed by name, in application order.
pub type MigrationList = IndexMap<String, MigrationInfo>;

/// Small state machine over schema revisions: each unit is either pending
/// or applied, and [`up`](Self::up)/[`down`](Self::down) move it across.
///
/// # Example
///
/// ```
/// use quarry::migration::{MigrationManager, SqlMigration, StaticSource};
/// use quarry::MockClient;
/// use std::rc::Rc;
///
/// let client = Rc::new(MockClient::new());
/// let source = StaticSource::new("app")
///     .with("0001", SqlMigration::new("users", "CREATE TABLE users (id INT)", "DROP TABLE users"));
/// let manager = MigrationManager::new(client, vec![Box::new(source)]);
///
/// let mut migrations = manager.get_migrations_info().unwrap();
/// manager.up(&mut migrations, "0001").unwrap();
/// assert!(migrations["0001"].migrated);
/// ```
pub struct MigrationManager {
    client: Rc<dyn DbClient>,
    sources: Vec<Box<dyn MigrationSource>>,
    table: String,
    units: RefCell<HashMap<String, Rc<dyn Migration>>>,
}

impl MigrationManager {
    pub fn new(client: Rc<dyn DbClient>, sources: Vec<Box<dyn MigrationSource>>) -> Self {
        Self {
            client,
            sources,
            table: DEFAULT_TABLE.to_string(),
            units: RefCell::new(HashMap::new()),
        }
    }

    /// Manager over the configured search roots and tracking table.
    pub fn from_config(client: Rc<dyn DbClient>, config: &QuarryConfig) -> Self {
        let sources = config
            .migrations
            .dirs
            .iter()
            .map(|dir| Box::new(SqlDirectorySource::new(dir)) as Box<dyn MigrationSource>)
            .collect();
        Self::new(client, sources).with_table(config.migrations.table.clone())
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every migration from every source, sorted by name.
    pub fn discover(&self) -> Result<Vec<DiscoveredMigration>, MigrationError> {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut all = Vec::new();
        for source in &self.sources {
            for found in source.discover()? {
                if let Some(first) = seen.get(&found.name) {
                    return Err(MigrationError::DuplicateMigration {
                        name: found.name,
                        first: first.clone(),
                        second: found.source_location,
                    });
                }
                seen.insert(found.name.clone(), found.source_location.clone());
                all.push(found);
            }
        }
        all.sort_by(|a, b| compare_names(&a.name, &b.name));
        Ok(all)
    }

    /// Discovered migrations joined against the tracking table.
    ///
    /// On first run the tracking table does not exist yet: it is created and
    /// every migration is reported as pending.
    pub fn get_migrations_info(&self) -> Result<MigrationList, MigrationError> {
        let discovered = self.discover()?;

        let mut list = MigrationList::with_capacity(discovered.len());
        let mut units = HashMap::with_capacity(discovered.len());
        for found in discovered {
            list.insert(
                found.name.clone(),
                MigrationInfo {
                    name: found.name.clone(),
                    source_location: found.source_location,
                    description: found.migration.description().to_string(),
                    checksum: found.checksum,
                    migrated: false,
                },
            );
            units.insert(found.name, found.migration);
        }
        *self.units.borrow_mut() = units;

        match self.applied_names() {
            Ok(applied) => {
                for name in applied {
                    match list.get_mut(&name) {
                        Some(info) => info.migrated = true,
                        None => log::warn!("Applied migration {name} has no source"),
                    }
                }
            }
            Err(QuarryError::Execute(err)) if err.is_table_not_found() => {
                log::warn!("Migration table {} not found, creating it", self.table);
                self.client
                    .exec(&create_state_table_sql(&self.table, self.client.dialect()))?;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(list)
    }

    /// Apply `name` and record it. Fails if it is already applied.
    pub fn up(&self, migrations: &mut MigrationList, name: &str) -> Result<(), MigrationError> {
        let info = migrations
            .get_mut(name)
            .ok_or_else(|| MigrationError::UnknownMigration(name.to_string()))?;
        if info.migrated {
            return Err(MigrationError::AlreadyApplied(name.to_string()));
        }
        let unit = self.unit(name)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(name, "up").entered();

        let insert = insert_applied_sql(&self.table);
        let params = Params::from([
            ("name".to_string(), Value::from(name)),
            ("description".to_string(), Value::from(info.description.as_str())),
        ]);
        transaction(&*self.client, |client| -> Result<(), MigrationError> {
            client.exec(&unit.up())?;
            client.prepare(insert).execute(&params)?;
            Ok(())
        })?;

        info.migrated = true;
        log::info!("Upgraded {name}");
        Ok(())
    }

    /// Revert `name` and forget it. Fails if it is not applied.
    pub fn down(&self, migrations: &mut MigrationList, name: &str) -> Result<(), MigrationError> {
        let info = migrations
            .get_mut(name)
            .ok_or_else(|| MigrationError::UnknownMigration(name.to_string()))?;
        if !info.migrated {
            return Err(MigrationError::NotApplied(name.to_string()));
        }
        let unit = self.unit(name)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(name, "down").entered();

        let delete = delete_applied_sql(&self.table);
        let params = Params::from([("name".to_string(), Value::from(name))]);
        transaction(&*self.client, |client| -> Result<(), MigrationError> {
            client.exec(&unit.down())?;
            client.prepare(delete).execute(&params)?;
            Ok(())
        })?;

        info.migrated = false;
        log::info!("Downgraded {name}");
        Ok(())
    }

    /// Apply every pending migration in order; returns the names applied.
    ///
    /// Stops at the first failure, leaving earlier migrations applied.
    pub fn up_all(&self, migrations: &mut MigrationList) -> Result<Vec<String>, MigrationError> {
        let pending: Vec<String> = migrations
            .values()
            .filter(|info| !info.migrated)
            .map(|info| info.name.clone())
            .collect();

        for name in &pending {
            self.up(migrations, name)?;
        }
        Ok(pending)
    }

    fn applied_names(&self) -> Result<Vec<String>, QuarryError> {
        let rows = self
            .client
            .prepare(select_applied_sql(&self.table))
            .execute(&Params::new())?
            .fetch_all();

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get("name") {
                Some(Value::Null) | None => None,
                Some(Value::Text(name)) => Some(name.clone()),
                Some(other) => Some(other.to_string()),
            })
            .collect())
    }

    fn unit(&self, name: &str) -> Result<Rc<dyn Migration>, MigrationError> {
        if let Some(unit) = self.units.borrow().get(name) {
            return Ok(Rc::clone(unit));
        }

        let found = self
            .discover()?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| MigrationError::UnknownMigration(name.to_string()))?;
        self.units
            .borrow_mut()
            .insert(found.name, Rc::clone(&found.migration));
        Ok(found.migration)
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.location()).collect::<Vec<_>>(),
            )
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
