//! User-defined link classes and the container catalog used by external
//! links.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hns_types::{Link, LinkClassId};
use parking_lot::RwLock;
use tracing::debug;

use crate::container::{Container, WeakContainer};
use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::location::Location;
use crate::traverse::TraverseCtx;

/// Behaviour behind a user-defined link class.
pub trait LinkClass: Send + Sync {
    /// Human-readable class name.
    fn name(&self) -> &str;

    /// Resolve a link of this class.
    ///
    /// `group` is a temporary handle to the group holding the link; the
    /// engine closes it after this returns. Further resolution should go
    /// through [`Group::locate`] with `ctx` so it shares the hop budget.
    /// Return `None` if the link's target does not exist.
    fn traverse(
        &self,
        link_name: &str,
        group: &Group,
        data: &[u8],
        ctx: &mut TraverseCtx,
    ) -> NsResult<Option<Location>>;

    /// Called after a link of this class is created in `group`.
    fn on_create(&self, _group: &Location, _link: &Link) -> NsResult<()> {
        Ok(())
    }

    /// Called after a link of this class is removed from `group`.
    fn on_delete(&self, _group: &Location, _link: &Link) -> NsResult<()> {
        Ok(())
    }
}

/// Registered user-defined link classes, shareable between containers.
#[derive(Default)]
pub struct LinkClassRegistry {
    classes: RwLock<HashMap<LinkClassId, Arc<dyn LinkClass>>>,
}

impl LinkClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `class` under `id`, replacing any class already there.
    ///
    /// Only ids in the user-defined range may be registered.
    pub fn register(&self, id: LinkClassId, class: Arc<dyn LinkClass>) -> NsResult<()> {
        let id = LinkClassId::user(id.get())?;
        debug!(class = %id, name = class.name(), "link class registered");
        self.classes.write().insert(id, class);
        Ok(())
    }

    /// Remove the class registered under `id`.
    pub fn unregister(&self, id: LinkClassId) -> NsResult<()> {
        match self.classes.write().remove(&id) {
            Some(_) => {
                debug!(class = %id, "link class unregistered");
                Ok(())
            }
            None => Err(NamespaceError::UnknownLinkClass(id)),
        }
    }

    /// Returns `true` if links of class `id` can be resolved. The built-in
    /// hard, soft and external classes always can.
    pub fn is_registered(&self, id: LinkClassId) -> bool {
        id == LinkClassId::HARD
            || id == LinkClassId::SOFT
            || id == LinkClassId::EXTERNAL
            || self.classes.read().contains_key(&id)
    }

    /// The class registered under `id`.
    pub fn get(&self, id: LinkClassId) -> Option<Arc<dyn LinkClass>> {
        self.classes.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl fmt::Debug for LinkClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<LinkClassId> = self.classes.read().keys().copied().collect();
        ids.sort();
        f.debug_struct("LinkClassRegistry")
            .field("classes", &ids)
            .finish()
    }
}

/// Finds open containers by file name for external links.
pub trait ContainerCatalog: Send + Sync {
    /// The open container named `file`, if any.
    fn lookup(&self, file: &str) -> Option<Container>;
}

/// A catalog of containers held by weak reference.
///
/// Closed or dropped containers are not returned.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<String, WeakContainer>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `container` reachable under its name.
    pub fn insert(&self, container: &Container) {
        self.entries
            .write()
            .insert(container.name().to_string(), container.downgrade());
    }

    /// Forget the container named `file`.
    pub fn remove(&self, file: &str) -> bool {
        self.entries.write().remove(file).is_some()
    }
}

impl ContainerCatalog for InMemoryCatalog {
    fn lookup(&self, file: &str) -> Option<Container> {
        self.entries
            .read()
            .get(file)
            .and_then(WeakContainer::upgrade)
            .filter(|c| !c.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nowhere;

    impl LinkClass for Nowhere {
        fn name(&self) -> &str {
            "nowhere"
        }

        fn traverse(
            &self,
            _link_name: &str,
            _group: &Group,
            _data: &[u8],
            _ctx: &mut TraverseCtx,
        ) -> NsResult<Option<Location>> {
            Ok(None)
        }
    }

    // ---- Test 1: Register, query and unregister ----
    #[test]
    fn register_lifecycle() {
        let registry = LinkClassRegistry::new();
        let id = LinkClassId::user(70).unwrap();
        assert!(!registry.is_registered(id));
        registry.register(id, Arc::new(Nowhere)).unwrap();
        assert!(registry.is_registered(id));
        assert_eq!(registry.get(id).unwrap().name(), "nowhere");
        assert_eq!(registry.len(), 1);

        registry.unregister(id).unwrap();
        assert!(!registry.is_registered(id));
        assert!(matches!(
            registry.unregister(id),
            Err(NamespaceError::UnknownLinkClass(_))
        ));
    }

    // ---- Test 2: Built-in classes are always registered ----
    #[test]
    fn builtins_registered() {
        let registry = LinkClassRegistry::new();
        assert!(registry.is_registered(LinkClassId::HARD));
        assert!(registry.is_registered(LinkClassId::SOFT));
        assert!(registry.is_registered(LinkClassId::EXTERNAL));
        assert!(registry.is_empty());
    }

    // ---- Test 3: Reserved ids cannot be registered ----
    #[test]
    fn reserved_ids_rejected() {
        let registry = LinkClassRegistry::new();
        let err = registry
            .register(LinkClassId::SOFT, Arc::new(Nowhere))
            .unwrap_err();
        assert!(matches!(err, NamespaceError::InvalidArgument(_)));
        assert!(registry
            .register(LinkClassId::from_raw(12), Arc::new(Nowhere))
            .is_err());
    }

    // ---- Test 4: Catalog forgets closed containers ----
    #[test]
    fn catalog_skips_closed() {
        let catalog = InMemoryCatalog::new();
        let c = Container::in_memory("a.h5").unwrap();
        catalog.insert(&c);
        assert!(catalog.lookup("a.h5").unwrap().ptr_eq(&c));
        assert!(catalog.lookup("b.h5").is_none());

        c.close().unwrap();
        assert!(catalog.lookup("a.h5").is_none());
        assert!(catalog.remove("a.h5"));
    }

    // ---- Test 5: Catalog does not keep containers alive ----
    #[test]
    fn catalog_is_weak() {
        let catalog = InMemoryCatalog::new();
        {
            let c = Container::in_memory("gone.h5").unwrap();
            catalog.insert(&c);
        }
        assert!(catalog.lookup("gone.h5").is_none());
    }
}
