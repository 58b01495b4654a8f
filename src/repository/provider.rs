use super::Repository;
use crate::config::QuarryConfig;
use crate::db::DbClient;
use crate::entity::Entity;
use crate::error::{QuarryError, Result};
use crate::metadata::MetadataRegistry;
use crate::types::TransformOptions;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Type-erased view of a repository, enough to clear its cache.
trait CachedRepository {
    fn clear(&self);
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<E: Entity> CachedRepository for Repository<E> {
    fn clear(&self) {
        Repository::clear(self);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Builds one repository per entity type over a shared client and registry.
///
/// Repositories are created on first request and reused afterwards, so every
/// caller of [`RepositoryProvider::get`] shares the same identity cache.
pub struct RepositoryProvider {
    client: Rc<dyn DbClient>,
    registry: Arc<MetadataRegistry>,
    options: TransformOptions,
    repositories: RefCell<HashMap<TypeId, Rc<dyn CachedRepository>>>,
}

impl RepositoryProvider {
    pub fn new(client: Rc<dyn DbClient>, registry: Arc<MetadataRegistry>, options: TransformOptions) -> Self {
        Self {
            client,
            registry,
            options,
            repositories: RefCell::new(HashMap::new()),
        }
    }

    /// Provider using the cipher key from `config`.
    pub fn from_config(client: Rc<dyn DbClient>, registry: Arc<MetadataRegistry>, config: &QuarryConfig) -> Self {
        Self::new(client, registry, config.transform_options())
    }

    /// The repository for `E`, created on first use.
    pub fn get<E: Entity>(&self) -> Result<Rc<Repository<E>>> {
        let type_id = TypeId::of::<E>();
        if let Some(existing) = self.repositories.borrow().get(&type_id) {
            return Rc::clone(existing)
                .into_any()
                .downcast::<Repository<E>>()
                .map_err(|_| {
                    QuarryError::State(format!(
                        "repository registered for {} has another type",
                        E::entity_name()
                    ))
                });
        }

        let repository = Rc::new(Repository::<E>::new(
            Rc::clone(&self.client),
            Arc::clone(&self.registry),
            self.options.clone(),
        )?);
        log::debug!("Created repository for {}", E::entity_name());
        self.repositories
            .borrow_mut()
            .insert(type_id, Rc::clone(&repository) as Rc<dyn CachedRepository>);
        Ok(repository)
    }

    #[must_use]
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    #[must_use]
    pub fn client(&self) -> &Rc<dyn DbClient> {
        &self.client
    }

    /// Clear the identity cache of every repository created so far.
    pub fn clear(&self) {
        for repository in self.repositories.borrow().values() {
            repository.clear();
        }
    }
}

impl std::fmt::Debug for RepositoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryProvider")
            .field("registry", &self.registry)
            .field("repositories", &self.repositories.borrow().len())
            .finish_non_exhaustive()
    }
}
