//! # Quarry
//!
//! Lightweight ORM: per-entity field metadata drives SQL generation, row
//! hydration and persistence through a pluggable [`DbClient`].
//!
//! - [`metadata`]: field types and relations per entity, behind a [`MetadataStore`]
//! - [`types`]: stored/view value transformers, including the authenticated `ciphered` type
//! - [`query`] and [`repository::compiler`]: filters, joins and placeholders turned into SQL
//! - [`repository`]: finders, create/update/delete and the per-request identity cache
//! - [`migration`]: discovering, applying and reverting schema migrations
//!
//! # Example
//!
//! ```
//! use quarry::{
//!     impl_entity, Condition, EntityMetadata, FieldType, MemoryMetadataStore, MetadataRegistry,
//!     MockClient, Repository, TransformOptions,
//! };
//! use std::rc::Rc;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: Option<i64>,
//!     email: String,
//! }
//!
//! impl_entity! { User as "user" { id, email } }
//!
//! let registry = Arc::new(MetadataRegistry::new(Arc::new(MemoryMetadataStore::new()), "app"));
//! registry
//!     .register(
//!         "user",
//!         EntityMetadata::builder("user", "user")
//!             .field("id", FieldType::Int)
//!             .field("email", FieldType::Plain)
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let client = Rc::new(MockClient::new());
//! let users = Repository::<User>::new(client.clone(), registry, TransformOptions::default()).unwrap();
//! let found = users.find_one_by(vec![Condition::eq("email", "a@example.com")]).unwrap();
//! assert!(found.is_none());
//! ```

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod hydrator;
pub mod metadata;
pub mod migration;
pub mod mock;
pub mod query;
pub mod repository;
pub mod telemetry;
pub mod types;
pub mod value;

pub use config::QuarryConfig;
pub use db::{transaction, DbClient, Dialect, Params, ResultCursor, Row};
pub use entity::{entity_ref, Entity, EntityRef};
pub use error::{ExecuteError, QuarryError, Result};
pub use hydrator::{Collection, Hydrator, IndexKey};
pub use metadata::{cache_key, EntityMetadata, MemoryMetadataStore, MetadataRegistry, MetadataStore, Relation};
pub use migration::{Migration, MigrationError, MigrationInfo, MigrationManager};
pub use mock::MockClient;
pub use query::{Action, Condition, Direction, FieldPath, FilterExpression, JoinKind, Operand, QueryBuilder, QueryFlag, Sort};
pub use repository::{Found, Repository, RepositoryProvider};
pub use types::{FieldType, TransformOptions};
pub use value::{FieldValue, FromFieldValue, ToFieldValue, Value};

#[cfg(feature = "postgres")]
pub use db::postgres::PostgresClient;
