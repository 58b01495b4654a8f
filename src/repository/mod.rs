//! Repositories: the CRUD and find surface for one entity type.
//!
//! A [`Repository`] compiles [`QueryBuilder`]s, runs them on its client,
//! hydrates the rows and keeps the last hydrated instance per primary key in an
//! identity cache. The cache is per repository, unsynchronized, and only
//! emptied by [`Repository::clear`].

pub mod compiler;
pub mod inflect;
mod provider;

pub use compiler::{CompiledQuery, ConditionCompiler};
pub use provider::RepositoryProvider;

use crate::db::{DbClient, Params};
use crate::entity::{entity_ref, Entity, EntityRef};
use crate::error::{QuarryError, Result};
use crate::hydrator::{Collection, Hydrator};
use crate::metadata::{EntityMetadata, MetadataRegistry};
use crate::query::{Condition, QueryBuilder, QueryFlag, Sort};
use crate::types::{FieldType, TransformOptions};
use crate::value::{FieldValue, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// Column used to mark rows as deleted without removing them.
pub const SOFT_DELETE_FIELD: &str = "isDeleted";

/// Result of [`Repository::find`]: one entity when the query was limited to a
/// single row, a collection otherwise.
#[derive(Debug)]
pub enum Found<E> {
    One(Option<EntityRef<E>>),
    Many(Collection<EntityRef<E>>),
}

impl<E> Found<E> {
    /// The single result, or a `State` error for a multi-row result.
    pub fn into_one(self) -> Result<Option<EntityRef<E>>> {
        match self {
            Found::One(item) => Ok(item),
            Found::Many(_) => Err(QuarryError::State(
                "query returned a collection, not a single row".to_string(),
            )),
        }
    }

    /// The collection, or a `State` error for a single-row result.
    pub fn into_many(self) -> Result<Collection<EntityRef<E>>> {
        match self {
            Found::Many(items) => Ok(items),
            Found::One(_) => Err(QuarryError::State(
                "query was limited to a single row".to_string(),
            )),
        }
    }
}

/// Repository for entity type `E`.
pub struct Repository<E: Entity> {
    client: Rc<dyn DbClient>,
    registry: Arc<MetadataRegistry>,
    metadata: Arc<EntityMetadata>,
    options: TransformOptions,
    cache: RefCell<HashMap<i64, EntityRef<E>>>,
}

impl<E: Entity> Repository<E> {
    /// Repository over `client`, with `E`'s metadata loaded from `registry`.
    pub fn new(
        client: Rc<dyn DbClient>,
        registry: Arc<MetadataRegistry>,
        options: TransformOptions,
    ) -> Result<Self> {
        let metadata = registry.get(E::entity_name())?;
        Ok(Self {
            client,
            registry,
            metadata,
            options,
            cache: RefCell::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// Fresh builder over this repository's table, aliased `t1`.
    #[must_use]
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(&self.metadata)
    }

    /// `{alias}.{field} as {alias}_{field}` for every field, or only for `only`
    /// when it is non-empty.
    #[must_use]
    pub fn select_columns(&self, alias: &str, only: &[&str]) -> Vec<String> {
        let mut query = QueryBuilder::new(&self.metadata).with_alias(alias);
        if !only.is_empty() {
            query = query.select_only(only);
        }
        query.selection_items(self.client.dialect())
    }

    /// Compile and run `query`.
    ///
    /// A query limited to one row yields [`Found::One`]; anything else yields
    /// [`Found::Many`]. Every hydrated entity replaces the cached instance for
    /// its id.
    pub fn find(&self, query: QueryBuilder) -> Result<Found<E>> {
        let single = query.limit() == Some(1);
        self.run(query, single)
    }

    pub fn find_one_by(&self, conditions: impl IntoIterator<Item = Condition>) -> Result<Option<EntityRef<E>>> {
        let query = self.query_builder().set_limit(Some(1)).add_conditions(conditions);
        self.run(query, true)?.into_one()
    }

    /// Filter, index, page (`(page, per_page)`, 1-based) and sort in one call.
    pub fn find_by(
        &self,
        conditions: impl IntoIterator<Item = Condition>,
        index_by: Option<&str>,
        page: Option<(u64, u64)>,
        sort: Vec<Sort>,
    ) -> Result<Collection<EntityRef<E>>> {
        let mut query = self
            .query_builder()
            .add_conditions(conditions)
            .set_sort(sort)
            .set_index(index_by);
        if let Some((page, per_page)) = page {
            query = query.set_page(page, per_page);
        }
        self.run(query, false)?.into_many()
    }

    /// Entity by primary key; a cached instance is returned without a query.
    ///
    /// With `for_update` the cache is bypassed so the row lock is always
    /// taken; the locked row replaces the cached instance.
    pub fn find_by_id(&self, id: i64, for_update: bool) -> Result<Option<EntityRef<E>>> {
        if !for_update {
            if let Some(cached) = self.cache.borrow().get(&id) {
                return Ok(Some(Rc::clone(cached)));
            }
        }

        let mut query = self
            .query_builder()
            .add_condition(Condition::eq("id", id))
            .set_limit(Some(1));
        if for_update {
            query = query.set_flag(QueryFlag::ForUpdate);
        }
        self.run(query, true)?.into_one()
    }

    pub fn find_all(&self, index_by: Option<&str>) -> Result<Collection<EntityRef<E>>> {
        let query = self.query_builder().set_index(index_by);
        self.run(query, false)?.into_many()
    }

    /// Entities referenced by `list` through `foreign_key` (default
    /// `{table}Id`), indexed by id. An empty id set returns without querying.
    pub fn find_by_relative_indexed<R: Entity>(
        &self,
        list: &[EntityRef<R>],
        foreign_key: Option<&str>,
        for_update: bool,
    ) -> Result<Collection<EntityRef<E>>> {
        let default_key = format!("{}Id", self.metadata.table_name());
        let foreign_key = foreign_key.unwrap_or(&default_key);

        let mut ids: Vec<Value> = Vec::new();
        for item in list {
            let id = match item.borrow().get_field(foreign_key)? {
                FieldValue::Null => continue,
                FieldValue::Int(i) => Value::Int(i),
                FieldValue::Text(s) => Value::Text(s),
                other => {
                    return Err(QuarryError::conversion(format!(
                        "{foreign_key} holds a {} value, not an id",
                        other.kind()
                    )))
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Ok(Collection::new());
        }

        let mut query = self
            .query_builder()
            .add_condition(Condition::In("id".into(), ids))
            .set_index(Some("id"));
        if for_update {
            query = query.set_flag(QueryFlag::ForUpdate);
        }
        self.run(query, false)?.into_many()
    }

    /// Insert `entity`. With `is_autoincrement`, `id` is left to the database
    /// and the generated key is written back onto the entity.
    pub fn create(&self, entity: &mut E, is_autoincrement: bool) -> Result<()> {
        let dialect = self.client.dialect();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut params = Params::new();

        for (field, ty) in self.metadata.fields() {
            if is_autoincrement && field == "id" {
                continue;
            }
            columns.push(dialect.quote(field));
            match self.store_value(entity, field, *ty)? {
                Value::Null => placeholders.push("NULL".to_string()),
                value => {
                    placeholders.push(format!(":{field}"));
                    params.insert(field.clone(), value);
                }
            }
        }

        let sql = format!(
            "INSERT INTO {}\n    ({})\nVALUES\n    ({})",
            dialect.ident(self.metadata.table_name()),
            columns.join(","),
            placeholders.join(", ")
        );
        self.client.prepare(sql).execute(&params)?;

        if is_autoincrement {
            let id = self.client.last_insert_id()?;
            entity.set_field("id", FieldValue::Int(id))?;
            log::debug!("Created {} #{id}", self.metadata.table_name());
        }
        Ok(())
    }

    /// Write `entity` back by id, restricted to `fields` when given.
    pub fn update(&self, entity: &E, fields: Option<&[&str]>) -> Result<()> {
        if let Some(fields) = fields {
            if let Some(unknown) = fields.iter().find(|f| !self.metadata.has_field(f)) {
                return Err(QuarryError::configuration(format!(
                    "cannot update unknown field `{unknown}` of {}",
                    self.metadata.entity()
                )));
            }
        }

        let dialect = self.client.dialect();
        let mut params = Params::new();
        params.insert("id".to_string(), self.id_of(entity)?);
        let mut sets = Vec::new();

        for (field, ty) in self.metadata.fields() {
            if field == "id" {
                continue;
            }
            if fields.is_some_and(|only| !only.contains(&field.as_str())) {
                continue;
            }
            match self.store_value(entity, field, *ty)? {
                Value::Null => sets.push(format!("{} = NULL", dialect.quote(field))),
                value => {
                    sets.push(format!("{} = :{field}", dialect.quote(field)));
                    params.insert(field.clone(), value);
                }
            }
        }
        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {}\nSET {}\nWHERE {} = :id",
            dialect.ident(self.metadata.table_name()),
            sets.join(", "),
            dialect.ident("id")
        );
        self.client.prepare(sql).execute(&params)?;
        Ok(())
    }

    /// Remove `entity`: a hard DELETE when `force`, otherwise set
    /// `isDeleted` and update that field only.
    pub fn delete(&self, entity: &mut E, force: bool) -> Result<()> {
        if force {
            let mut params = Params::new();
            params.insert("id".to_string(), self.id_of(entity)?);
            let dialect = self.client.dialect();
            let sql = format!(
                "DELETE FROM {} WHERE {} = :id",
                dialect.ident(self.metadata.table_name()),
                dialect.ident("id")
            );
            self.client.prepare(sql).execute(&params)?;
            return Ok(());
        }

        let flag = match self.metadata.field(SOFT_DELETE_FIELD) {
            Some(FieldType::Bool) => FieldValue::Bool(true),
            Some(_) => FieldValue::Int(1),
            None => {
                return Err(QuarryError::configuration(format!(
                    "{} has no `{SOFT_DELETE_FIELD}` field; soft delete is not available",
                    self.metadata.entity()
                )))
            }
        };
        entity.set_field(SOFT_DELETE_FIELD, flag)?;
        self.update(entity, Some(&[SOFT_DELETE_FIELD][..]))
    }

    /// Row count of the previous `SQL_CALC_FOUND_ROWS` query on this connection.
    pub fn get_found_rows(&self) -> Result<i64> {
        if !self.client.dialect().supports_found_rows() {
            return Err(QuarryError::configuration(
                "found-rows counting is not available for this client",
            ));
        }
        let mut cursor = self.client.prepare("SELECT FOUND_ROWS()").execute(&Params::new())?;
        cursor
            .fetch_scalar()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| QuarryError::conversion("FOUND_ROWS() returned no integer"))
    }

    /// Forget every cached entity.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Cached instance for `id`, if any.
    #[must_use]
    pub fn cached(&self, id: i64) -> Option<EntityRef<E>> {
        self.cache.borrow().get(&id).cloned()
    }

    fn run(&self, mut query: QueryBuilder, single: bool) -> Result<Found<E>> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::find_span(query.table()).entered();

        let compiled = ConditionCompiler::new(&self.metadata, &self.registry, self.client.dialect())
            .compile(&mut query)?;
        let mut cursor = self.client.prepare(compiled.sql).execute(&compiled.params)?;

        let hydrator = Hydrator::new(&self.metadata, &self.options).only(query.selected_fields());
        if single {
            let item = hydrator
                .hydrate_one::<E>(query.alias(), &mut cursor)?
                .map(|entity| self.remember(entity));
            Ok(Found::One(item))
        } else {
            let items = hydrator
                .hydrate_many::<E>(query.alias(), &mut cursor, query.index())?
                .map(|entity| self.remember(entity));
            Ok(Found::Many(items))
        }
    }

    /// Wrap a freshly hydrated entity and make it the cached instance for its id.
    fn remember(&self, entity: E) -> EntityRef<E> {
        let id = entity.id();
        let item = entity_ref(entity);
        if let Some(id) = id {
            self.cache.borrow_mut().insert(id, Rc::clone(&item));
        }
        item
    }

    fn store_value(&self, entity: &E, field: &str, ty: FieldType) -> Result<Value> {
        ty.to_store(&entity.get_field(field)?, &self.options)
    }

    fn id_of(&self, entity: &E) -> Result<Value> {
        entity.id().map(Value::Int).ok_or_else(|| {
            QuarryError::State(format!(
                "{} entity has no id; create it first",
                self.metadata.entity()
            ))
        })
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &self.metadata.entity())
            .field("cached", &self.cache.borrow().len())
            .finish_non_exhaustive()
    }
}
