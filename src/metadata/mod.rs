//! Entity metadata: table name, ordered field transformers and relation
//! descriptors for one entity type.
//!
//! Metadata is produced outside this crate (hand-declared, generated, or read
//! from configuration), stored in a [`MetadataStore`] and read back through a
//! [`MetadataRegistry`]. It is never mutated after [`EntityMetadataBuilder::build`].

mod registry;
mod store;

pub use registry::MetadataRegistry;
pub use store::{cache_key, MemoryMetadataStore, MetadataStore};

use crate::error::{QuarryError, Result};
use crate::types::FieldType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a relation field joins to another entity's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// `{alias}.{foreign_key_field} = {join}.id`
    ManyToOne {
        target_entity: String,
        foreign_key_field: String,
    },
    /// `{alias}.id = {join}.{table}Id`
    ManyToMany { target_entity: String },
}

impl Relation {
    pub fn many_to_one(target_entity: impl Into<String>, foreign_key_field: impl Into<String>) -> Self {
        Relation::ManyToOne {
            target_entity: target_entity.into(),
            foreign_key_field: foreign_key_field.into(),
        }
    }

    /// Many-to-one relation using the `{field}Id` foreign key convention.
    pub fn many_to_one_default(target_entity: impl Into<String>, field: &str) -> Self {
        Self::many_to_one(target_entity, format!("{field}Id"))
    }

    pub fn many_to_many(target_entity: impl Into<String>) -> Self {
        Relation::ManyToMany {
            target_entity: target_entity.into(),
        }
    }

    #[must_use]
    pub fn target_entity(&self) -> &str {
        match self {
            Relation::ManyToOne { target_entity, .. } | Relation::ManyToMany { target_entity } => {
                target_entity
            }
        }
    }
}

/// Immutable description of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    entity: String,
    table_name: String,
    fields: IndexMap<String, FieldType>,
    relations: IndexMap<String, Relation>,
}

impl EntityMetadata {
    /// Start describing `entity` (its type identifier) stored in `table_name`.
    pub fn builder(entity: impl Into<String>, table_name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder {
            entity: entity.into(),
            table_name: table_name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fields in column declaration order.
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, FieldType> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[must_use]
    pub fn relations(&self) -> &IndexMap<String, Relation> {
        &self.relations
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Re-check the construction invariants (used after deserialization).
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(QuarryError::configuration(format!(
                "entity {} has an empty table name",
                self.entity
            )));
        }
        if let Some(name) = self.relations.keys().find(|r| self.fields.contains_key(*r)) {
            return Err(QuarryError::configuration(format!(
                "entity {}: `{name}` is declared both as a field and as a relation",
                self.entity
            )));
        }
        Ok(())
    }
}

/// Builder for [`EntityMetadata`].
#[derive(Debug)]
pub struct EntityMetadataBuilder {
    entity: String,
    table_name: String,
    fields: Vec<(String, FieldType)>,
    relations: Vec<(String, Relation)>,
}

impl EntityMetadataBuilder {
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.push((name.into(), relation));
        self
    }

    pub fn build(self) -> Result<EntityMetadata> {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for (name, ty) in self.fields {
            if fields.insert(name.clone(), ty).is_some() {
                return Err(QuarryError::configuration(format!(
                    "entity {}: field `{name}` declared twice",
                    self.entity
                )));
            }
        }

        let mut relations = IndexMap::with_capacity(self.relations.len());
        for (name, relation) in self.relations {
            if relations.insert(name.clone(), relation).is_some() {
                return Err(QuarryError::configuration(format!(
                    "entity {}: relation `{name}` declared twice",
                    self.entity
                )));
            }
        }

        let metadata = EntityMetadata {
            entity: self.entity,
            table_name: self.table_name,
            fields,
            relations,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}
