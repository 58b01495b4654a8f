//! Schema migrations
//!
//! Migrations are discovered from one or more [`MigrationSource`]s, joined
//! against a tracking table and applied or reverted one at a time by the
//! [`MigrationManager`].
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry::migration::MigrationManager;
//! use quarry::{DbClient, QuarryConfig};
//! use std::rc::Rc;
//!
//! # fn run(client: Rc<dyn DbClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = QuarryConfig::load()?;
//! let manager = MigrationManager::from_config(client, &config);
//!
//! let mut migrations = manager.get_migrations_info()?;
//! for name in manager.up_all(&mut migrations)? {
//!     println!("Upgraded {name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod migration;
pub mod source;
pub mod state_table;

pub use error::MigrationError;
pub use manager::{MigrationInfo, MigrationList, MigrationManager};
pub use migration::{Migration, SqlMigration};
pub use source::{DiscoveredMigration, MigrationSource, SqlDirectorySource, StaticSource};
