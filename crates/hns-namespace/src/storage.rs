//! The link-storage seam.
//!
//! A group keeps its links in one of two forms. Compact groups keep one
//! link message per link in their object header; dense groups keep link
//! records in a heap indexed by name hash (and optionally by creation
//! order). Both forms implement [`LinkStorage`], and callers above this
//! layer never depend on which form is active.

use std::fmt;

use hns_types::{IndexType, IterOrder, Link};

use crate::error::NsResult;
use crate::table::LinkTable;

/// The physical storage form of a group's links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageForm {
    /// Link messages in the group's object header.
    Compact,
    /// Heap plus sorted indices.
    Dense,
}

impl fmt::Display for StorageForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => write!(f, "compact"),
            Self::Dense => write!(f, "dense"),
        }
    }
}

/// Link operations shared by both storage forms.
///
/// Implementations do no bookkeeping beyond storing links: creation-order
/// assignment, duplicate checks and form conversion happen one layer up.
pub trait LinkStorage {
    /// Which form this is.
    fn form(&self) -> StorageForm;

    /// Store `link`. The name must not already be present.
    fn insert(&self, link: &Link) -> NsResult<()>;

    /// Find a link by name.
    fn lookup(&self, name: &str) -> NsResult<Option<Link>>;

    /// Remove a link by name, returning it if it was present.
    fn remove(&self, name: &str) -> NsResult<Option<Link>>;

    /// Number of links.
    fn len(&self) -> NsResult<u64>;

    /// Every link, in no particular order. Callers that need an order go
    /// through [`build_table`](Self::build_table).
    fn links(&self) -> NsResult<Vec<Link>>;

    fn is_empty(&self) -> NsResult<bool> {
        Ok(self.len()? == 0)
    }

    /// An ordered snapshot of every link.
    fn build_table(&self, index: IndexType, order: IterOrder) -> NsResult<LinkTable> {
        Ok(LinkTable::build(self.links()?, index, order))
    }

    /// The `n`th link in the given order.
    fn lookup_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<Link> {
        let table = self.build_table(index, order)?;
        table.get(n).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hns_store::{HeaderMessage, HeaderStore, InMemoryStore, LinkInfoMessage, Store};
    use hns_types::{Address, ObjectType};
    use proptest::prelude::*;

    use super::*;
    use crate::compact::CompactStorage;
    use crate::dense::DenseStorage;

    /// A compact and a dense group over the same store.
    fn both_forms(corder_index: bool) -> (CompactStorage, DenseStorage) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let compact_addr = store.create_header(ObjectType::Group).unwrap();
        store
            .message_create(
                compact_addr,
                &HeaderMessage::LinkInfo(LinkInfoMessage::compact(true, corder_index)),
            )
            .unwrap();
        let dense_addr = store.create_header(ObjectType::Group).unwrap();
        let mut info = LinkInfoMessage::compact(true, corder_index);
        info.heap = store.heap_create().unwrap();
        info.name_index = store.index_create().unwrap();
        if corder_index {
            info.corder_index = store.index_create().unwrap();
        }
        store
            .message_create(dense_addr, &HeaderMessage::LinkInfo(info.clone()))
            .unwrap();
        (
            CompactStorage::new(Arc::clone(&store), compact_addr),
            DenseStorage::new(store, dense_addr, info),
        )
    }

    fn tagged(name: &str, corder: u64) -> Link {
        let mut link = if corder % 2 == 0 {
            Link::hard(name, Address::new(0x1000 + corder))
        } else {
            Link::soft(name, format!("/target/{name}"))
        };
        link.creation_order = Some(corder);
        link
    }

    fn storages(pair: &(CompactStorage, DenseStorage)) -> [&dyn LinkStorage; 2] {
        [&pair.0, &pair.1]
    }

    // ---- Test 1: Both forms report their form ----
    #[test]
    fn forms_are_reported() {
        let pair = both_forms(false);
        assert_eq!(pair.0.form(), StorageForm::Compact);
        assert_eq!(pair.1.form(), StorageForm::Dense);
    }

    // ---- Test 2: Insert/lookup/remove through the trait ----
    #[test]
    fn insert_lookup_remove_through_trait() {
        let pair = both_forms(false);
        for storage in storages(&pair) {
            let link = tagged("x", 0);
            storage.insert(&link).unwrap();
            assert_eq!(storage.lookup("x").unwrap(), Some(link.clone()));
            assert_eq!(storage.len().unwrap(), 1);

            assert_eq!(storage.remove("x").unwrap(), Some(link));
            assert_eq!(storage.lookup("x").unwrap(), None);
            assert!(storage.is_empty().unwrap());
            assert_eq!(storage.remove("x").unwrap(), None);
        }
    }

    // ---- Test 3: Empty group gives an empty table ----
    #[test]
    fn empty_group_empty_table() {
        let pair = both_forms(true);
        for storage in storages(&pair) {
            let table = storage
                .build_table(IndexType::Name, IterOrder::Increasing)
                .unwrap();
            assert!(table.is_empty());
            assert!(storage
                .lookup_by_index(IndexType::CreationOrder, IterOrder::Increasing, 0)
                .is_err());
        }
    }

    // ---- Test 4: Index lookups agree in both directions ----
    #[test]
    fn lookup_by_index_agrees() {
        let pair = both_forms(true);
        for storage in storages(&pair) {
            for (i, name) in ["delta", "alpha", "charlie", "bravo"].iter().enumerate() {
                storage.insert(&tagged(name, i as u64)).unwrap();
            }
        }
        for (index, order, n) in [
            (IndexType::Name, IterOrder::Increasing, 0),
            (IndexType::Name, IterOrder::Decreasing, 0),
            (IndexType::CreationOrder, IterOrder::Increasing, 1),
            (IndexType::CreationOrder, IterOrder::Decreasing, 0),
            (IndexType::CreationOrder, IterOrder::Native, 3),
            (IndexType::Name, IterOrder::Native, 0),
            (IndexType::Name, IterOrder::Native, 3),
        ] {
            assert_eq!(
                pair.0.lookup_by_index(index, order, n).unwrap(),
                pair.1.lookup_by_index(index, order, n).unwrap(),
                "{index:?} {order:?} {n}"
            );
        }
        assert_eq!(
            pair.1
                .lookup_by_index(IndexType::CreationOrder, IterOrder::Decreasing, 0)
                .unwrap()
                .name,
            "bravo"
        );
    }

    proptest! {
        // ---- Property: compact and dense behave identically ----
        #[test]
        fn compact_dense_parity(
            names in proptest::collection::btree_set("[a-z]{1,8}", 1..30),
            removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let pair = both_forms(true);
            let names: Vec<String> = names.into_iter().collect();
            for storage in storages(&pair) {
                for (i, name) in names.iter().enumerate() {
                    storage.insert(&tagged(name, i as u64)).unwrap();
                }
                for r in &removals {
                    storage.remove(&names[r.index(names.len())]).unwrap();
                }
            }

            prop_assert_eq!(pair.0.len().unwrap(), pair.1.len().unwrap());
            for name in &names {
                prop_assert_eq!(pair.0.lookup(name).unwrap(), pair.1.lookup(name).unwrap());
            }
            for index in [IndexType::Name, IndexType::CreationOrder] {
                for order in [IterOrder::Increasing, IterOrder::Decreasing, IterOrder::Native] {
                    prop_assert_eq!(
                        pair.0.build_table(index, order).unwrap(),
                        pair.1.build_table(index, order).unwrap()
                    );
                }
            }
        }
    }
}
