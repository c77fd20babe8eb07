//! Root group bootstrap.

use hns_store::{HeaderStore, RootHint, Superblock, SUPERBLOCK_ADDR};
use tracing::{debug, info, warn};

use crate::config::GroupCreateProps;
use crate::container::Container;
use crate::error::NsResult;
use crate::group;
use crate::linkset;

/// Create or find the root group and install its pinned descriptor.
///
/// Creating allocates a fresh group whose only link is the superblock.
/// Opening validates the stored root and checks the superblock's cached
/// storage hint against it, rewriting a stale hint when the container is
/// writable.
pub(crate) fn mkroot(c: &Container, create: bool) -> NsResult<()> {
    if c.inner.root.lock().is_some() {
        return Ok(());
    }
    let store = c.store();
    let addr = if create {
        let props = GroupCreateProps::from_config(c.config());
        let addr = group::create_group_header(c, &props)?;
        store.adjust_link_count(addr, 1)?;
        let info = linkset::link_info(c, addr)?;
        store.write_superblock(&Superblock {
            root: addr,
            root_hint: Some(RootHint::from_link_info(&info)),
        })?;
        c.cache().mark_dirty(SUPERBLOCK_ADDR, SUPERBLOCK_ADDR);
        debug!(addr = %addr, "root group created");
        addr
    } else {
        let mut sb = store.superblock()?;
        let info = linkset::link_info(c, sb.root)?;
        match &sb.root_hint {
            Some(hint) if !hint.matches(&info) => {
                if c.access().is_writable() {
                    sb.root_hint = Some(RootHint::from_link_info(&info));
                    store.write_superblock(&sb)?;
                    c.cache().mark_dirty(SUPERBLOCK_ADDR, SUPERBLOCK_ADDR);
                    info!(addr = %sb.root, "repaired stale root storage hint");
                } else {
                    warn!(addr = %sb.root, "stale root storage hint left in read-only container");
                }
            }
            _ => {}
        }
        debug!(addr = %sb.root, "root group opened");
        sb.root
    };
    let desc = c.inner.registry.lock().install_root(addr);
    *c.inner.root.lock() = Some(desc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hns_store::{InMemoryStore, Store};
    use hns_types::ObjectType;

    use super::*;
    use crate::config::Access;
    use crate::error::NamespaceError;

    fn stale_store() -> Arc<dyn Store> {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let c = Container::builder("first")
            .store(Arc::clone(&store))
            .create()
            .unwrap();
        let root = c.root().unwrap();
        root.convert_to_dense().unwrap();
        root.close().unwrap();
        c.close().unwrap();
        store
    }

    fn hint_is_current(store: &Arc<dyn Store>) -> bool {
        let sb = store.superblock().unwrap();
        let c = Container::builder("check")
            .store(Arc::clone(store))
            .access(Access::ReadOnly)
            .open()
            .unwrap();
        let info = linkset::link_info(&c, sb.root).unwrap();
        sb.root_hint.unwrap().matches(&info)
    }

    // ---- Test 1: A new root has one link and a matching hint ----
    #[test]
    fn create_root() {
        let c = Container::in_memory("new").unwrap();
        let addr = c.root_addr().unwrap();
        assert_eq!(c.store().link_count(addr).unwrap(), 1);
        let sb = c.store().superblock().unwrap();
        assert_eq!(sb.root, addr);
        assert!(c.cache().is_dirty(SUPERBLOCK_ADDR));
        let info = linkset::link_info(&c, addr).unwrap();
        assert!(sb.root_hint.unwrap().matches(&info));
    }

    // ---- Test 2: mkroot is a no-op once the root exists ----
    #[test]
    fn mkroot_idempotent() {
        let c = Container::in_memory("twice").unwrap();
        let addr = c.root_addr().unwrap();
        mkroot(&c, true).unwrap();
        assert_eq!(c.root_addr().unwrap(), addr);
        assert_eq!(c.store().superblock().unwrap().root, addr);
    }

    // ---- Test 3: Reopening finds the same namespace ----
    #[test]
    fn reopen_sees_links() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let c = Container::builder("first")
            .store(Arc::clone(&store))
            .create()
            .unwrap();
        c.root()
            .unwrap()
            .create_object("d", ObjectType::Dataset)
            .unwrap();
        c.close().unwrap();

        let again = Container::builder("second").store(store).open().unwrap();
        assert!(again.root().unwrap().exists("d").unwrap());
    }

    // ---- Test 4: Stale hint repaired under write access ----
    #[test]
    fn stale_hint_repaired_when_writable() {
        let store = stale_store();
        assert!(!hint_is_current(&store));
        let c = Container::builder("rw")
            .store(Arc::clone(&store))
            .open()
            .unwrap();
        c.close().unwrap();
        assert!(hint_is_current(&store));
    }

    // ---- Test 5: Stale hint left alone under read-only access ----
    #[test]
    fn stale_hint_kept_when_read_only() {
        let store = stale_store();
        let c = Container::builder("ro")
            .store(Arc::clone(&store))
            .access(Access::ReadOnly)
            .open()
            .unwrap();
        assert!(c.root().unwrap().info().is_ok());
        c.close().unwrap();
        assert!(!hint_is_current(&store));
    }

    // ---- Test 6: Opening needs a superblock naming a group ----
    #[test]
    fn open_validates_root() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let err = Container::builder("empty")
            .store(Arc::clone(&store))
            .open()
            .unwrap_err();
        assert!(matches!(err, NamespaceError::Store(_)));

        let leaf = store.create_header(ObjectType::Dataset).unwrap();
        store
            .write_superblock(&Superblock {
                root: leaf,
                root_hint: None,
            })
            .unwrap();
        let err = Container::builder("leaf").store(store).open().unwrap_err();
        assert!(matches!(err, NamespaceError::WrongType { .. }));
    }
}
