//! Row ⇄ entity mapping.
//!
//! Columns are read as `{alias}_{field}` and passed through the field's
//! [`FieldType`](crate::FieldType) in declaration order.

use crate::db::{ResultCursor, Row};
use crate::entity::Entity;
use crate::error::{QuarryError, Result};
use crate::metadata::EntityMetadata;
use crate::types::TransformOptions;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// Key of a [`Collection`] entry.
///
/// Stored values are normalised the way associative-array keys are: integers
/// and canonical integer strings become `Int`, booleans `0`/`1`, floats are
/// truncated, null becomes the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Int(i64),
    Text(String),
}

impl IndexKey {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Text(String::new()),
            Value::Bool(b) => IndexKey::Int(i64::from(*b)),
            Value::Int(i) => IndexKey::Int(*i),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(x) => IndexKey::Int(x.trunc() as i64),
            Value::Text(s) => match canonical_int(s) {
                Some(i) => IndexKey::Int(i),
                None => IndexKey::Text(s.clone()),
            },
        }
    }
}

/// `"42"` and `"-7"` are integers; `"042"`, `"+1"`, `" 1"` and `"-0"` are not.
fn canonical_int(s: &str) -> Option<i64> {
    let i: i64 = s.parse().ok()?;
    (i.to_string() == s).then_some(i)
}

impl From<i64> for IndexKey {
    fn from(i: i64) -> Self {
        IndexKey::Int(i)
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::from_value(&Value::Text(s.to_owned()))
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(i) => write!(f, "{i}"),
            IndexKey::Text(s) => f.write_str(s),
        }
    }
}

/// Insertion-ordered result map.
///
/// Re-inserting an existing key replaces the value in place (last row wins,
/// first position kept).
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: IndexMap<IndexKey, T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
        }
    }
}

impl<T> Collection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: IndexKey, item: T) -> Option<T> {
        self.items.insert(key, item)
    }

    #[must_use]
    pub fn get(&self, key: impl Into<IndexKey>) -> Option<&T> {
        self.items.get(&key.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.items.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &T)> {
        self.items.iter()
    }

    /// Convert every item, keeping keys and order.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Collection<U> {
        Collection {
            items: self.items.into_iter().map(|(k, v)| (k, f(v))).collect(),
        }
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.items.into_values()
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = (IndexKey, T);
    type IntoIter = indexmap::map::IntoIter<IndexKey, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Builds entities from rows for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct Hydrator<'a> {
    metadata: &'a EntityMetadata,
    options: &'a TransformOptions,
    only: Option<&'a [String]>,
}

impl<'a> Hydrator<'a> {
    #[must_use]
    pub fn new(metadata: &'a EntityMetadata, options: &'a TransformOptions) -> Self {
        Self {
            metadata,
            options,
            only: None,
        }
    }

    /// Hydrate only `fields`; the rest keep their default value.
    #[must_use]
    pub fn only(mut self, fields: &'a [String]) -> Self {
        self.only = Some(fields);
        self
    }

    /// Build one entity from `row`.
    pub fn hydrate<E: Entity>(&self, alias: &str, row: &Row) -> Result<E> {
        let mut entity = E::default();
        for (field, ty) in self.metadata.fields() {
            if let Some(only) = self.only {
                if !only.contains(field) {
                    continue;
                }
            }
            let column = format!("{alias}_{field}");
            let stored = row.get(&column).ok_or_else(|| {
                QuarryError::conversion(format!(
                    "row for {} has no column {column}",
                    self.metadata.table_name()
                ))
            })?;
            entity.set_field(field, ty.to_view(stored, self.options)?)?;
        }
        Ok(entity)
    }

    /// Read exactly one row; `None` when the cursor is empty.
    pub fn hydrate_one<E: Entity>(&self, alias: &str, cursor: &mut ResultCursor) -> Result<Option<E>> {
        cursor
            .fetch_one()
            .map(|row| self.hydrate(alias, &row))
            .transpose()
    }

    /// Consume every row.
    ///
    /// With `index_by`, entries are keyed by that field's stored column value
    /// (not its view value); duplicate keys keep the last row. Otherwise keys
    /// are positions `0..n`.
    pub fn hydrate_many<E: Entity>(
        &self,
        alias: &str,
        cursor: &mut ResultCursor,
        index_by: Option<&str>,
    ) -> Result<Collection<E>> {
        let mut items = Collection::new();
        for row in cursor.fetch_all() {
            let key = match index_by {
                None => IndexKey::Int(items.len() as i64),
                Some(field) => {
                    let column = format!("{alias}_{field}");
                    let stored = row.get(&column).ok_or_else(|| {
                        QuarryError::conversion(format!("cannot index by missing column {column}"))
                    })?;
                    IndexKey::from_value(stored)
                }
            };
            items.insert(key, self.hydrate(alias, &row)?);
        }
        Ok(items)
    }
}
