use super::{cache_key, EntityMetadata, MetadataStore};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-through memo over a [`MetadataStore`].
///
/// Each type name is fetched from the store at most once per registry; later
/// lookups are served from memory for the lifetime of the registry.
pub struct MetadataRegistry {
    store: Arc<dyn MetadataStore>,
    namespace: String,
    loaded: RwLock<HashMap<String, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store key for `type_name` under this registry's namespace.
    #[must_use]
    pub fn key_for(&self, type_name: &str) -> String {
        cache_key(&self.namespace, type_name)
    }

    /// Metadata for `type_name`; a store miss is a `NotFound` error.
    pub fn get(&self, type_name: &str) -> Result<Arc<EntityMetadata>> {
        let key = self.key_for(type_name);
        if let Some(found) = self.loaded.read().get(&key) {
            return Ok(Arc::clone(found));
        }

        let metadata = self.store.get(&key)?;
        log::debug!("Loaded metadata for {type_name} from store key {key}");
        self.loaded.write().insert(key, Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Write `metadata` through to the store and drop any memoized copy.
    pub fn register(&self, type_name: &str, metadata: EntityMetadata) -> Result<()> {
        let key = self.key_for(type_name);
        self.store.set(&key, metadata)?;
        self.loaded.write().remove(&key);
        Ok(())
    }

    /// Table backing `type_name`, used to resolve relation joins.
    pub fn table_name_of(&self, type_name: &str) -> Result<String> {
        Ok(self.get(type_name)?.table_name().to_owned())
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("namespace", &self.namespace)
            .field("loaded", &self.loaded.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;
    use crate::metadata::MemoryMetadataStore;
    use crate::types::FieldType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryMetadataStore,
        gets: AtomicUsize,
    }

    impl MetadataStore for CountingStore {
        fn get(&self, key: &str) -> Result<Arc<EntityMetadata>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, metadata: EntityMetadata) -> Result<()> {
            self.inner.set(key, metadata)
        }
    }

    #[test]
    fn test_get_is_memoized() {
        let store = Arc::new(CountingStore {
            inner: MemoryMetadataStore::new(),
            gets: AtomicUsize::new(0),
        });
        let registry = MetadataRegistry::new(store.clone(), "quarry");
        registry
            .register(
                "app::Customer",
                EntityMetadata::builder("app::Customer", "customer")
                    .field("id", FieldType::Int)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let a = registry.get("app::Customer").unwrap();
        let b = registry.get("app::Customer").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(registry.table_name_of("app::Customer").unwrap(), "customer");
    }

    #[test]
    fn test_miss_is_not_found() {
        let registry = MetadataRegistry::new(Arc::new(MemoryMetadataStore::new()), "quarry");
        assert!(matches!(
            registry.get("app::Missing"),
            Err(QuarryError::NotFound(_))
        ));
    }
}
