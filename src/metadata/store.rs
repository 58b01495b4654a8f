//! Key-value contract for persisted metadata.

use super::EntityMetadata;
use crate::error::{QuarryError, Result};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Where built metadata lives between process starts.
///
/// `get` never computes anything: a missing key is a [`QuarryError::NotFound`].
/// `set` overwrites unconditionally.
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Arc<EntityMetadata>>;
    fn set(&self, key: &str, metadata: EntityMetadata) -> Result<()>;
}

/// Process-local store, typically filled at startup.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<String, Arc<EntityMetadata>>>,
}

impl MemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, key: &str) -> Result<Arc<EntityMetadata>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| QuarryError::NotFound(format!("metadata {key} must exist in the store")))
    }

    fn set(&self, key: &str, metadata: EntityMetadata) -> Result<()> {
        self.entries.write().insert(key.to_owned(), Arc::new(metadata));
        Ok(())
    }
}

/// Deterministic store key for an entity type.
///
/// `namespace` separates independent deployments sharing one store; the type
/// name is lowercased with `::` mapped to `.` so producer and consumer agree on
/// `app::Order`, `App::Order` and `app::order` alike. Any other character
/// outside `[a-z0-9_.]` is kept as `-{hex code point}-`, so `Wrapper<A>` and
/// `WrapperA` stay distinct.
#[must_use]
pub fn cache_key(namespace: &str, type_name: &str) -> String {
    let digest = Sha256::digest(namespace.as_bytes());
    let ns: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let mut normalized = String::with_capacity(type_name.len());
    for c in type_name
        .trim()
        .trim_start_matches("::")
        .replace("::", ".")
        .to_ascii_lowercase()
        .chars()
    {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            normalized.push(c);
        } else {
            normalized.push_str(&format!("-{:x}-", u32::from(c)));
        }
    }
    format!("quarry.{ns}.entity.{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryMetadataStore::new();
        assert!(matches!(
            store.get("quarry.x.entity.order"),
            Err(QuarryError::NotFound(_))
        ));
    }

    #[test]
    fn test_set_overwrites() {
        let store = MemoryMetadataStore::new();
        let v1 = EntityMetadata::builder("app::Order", "order").build().unwrap();
        let v2 = EntityMetadata::builder("app::Order", "orders")
            .field("id", FieldType::Int)
            .build()
            .unwrap();
        store.set("k", v1).unwrap();
        store.set("k", v2).unwrap();
        assert_eq!(store.get("k").unwrap().table_name(), "orders");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_cache_key_is_deterministic_and_normalized() {
        let a = cache_key("quarry", "app::model::Order");
        let b = cache_key("quarry", "App::Model::ORDER");
        assert_eq!(a, b);
        assert!(a.starts_with("quarry."));
        assert!(a.ends_with(".entity.app.model.order"));
        assert_ne!(a, cache_key("other", "app::model::Order"));
        assert_ne!(cache_key("quarry", "a::bc"), cache_key("quarry", "ab::c"));
    }

    #[test]
    fn test_cache_key_escapes_instead_of_dropping() {
        let generic = cache_key("quarry", "app::Wrapper<A>");
        assert_ne!(generic, cache_key("quarry", "app::WrapperA"));
        assert!(generic.ends_with(".entity.app.wrapper-3c-a-3e-"), "{generic}");
        assert_ne!(
            cache_key("quarry", "app::Pair<A, B>"),
            cache_key("quarry", "app::Pair<A,B>")
        );
    }
}
