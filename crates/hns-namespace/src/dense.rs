use std::sync::Arc;

use hns_store::{HeapId, HeapStore, IndexKey, IndexStore, LinkInfoMessage, Store, StoreError};
use hns_types::{Address, IndexType, IterOrder, Link};

use crate::error::{NamespaceError, NsResult};
use crate::storage::{LinkStorage, StorageForm};

/// Links stored as bincode records in a heap, indexed by name hash and,
/// when the group indexes creation order, by creation-order tag.
pub struct DenseStorage {
    store: Arc<dyn Store>,
    addr: Address,
    info: LinkInfoMessage,
}

impl DenseStorage {
    pub fn new(store: Arc<dyn Store>, addr: Address, info: LinkInfoMessage) -> Self {
        Self { store, addr, info }
    }

    fn has_corder_index(&self) -> bool {
        !self.info.corder_index.is_undefined()
    }

    fn encode(&self, link: &Link) -> NsResult<Vec<u8>> {
        bincode::serialize(link).map_err(|e| {
            NamespaceError::corrupt(self.addr, format!("cannot encode link {:?}: {e}", link.name))
        })
    }

    fn read(&self, id: HeapId) -> NsResult<Link> {
        let bytes = self.store.heap_read(self.info.heap, id)?;
        bincode::deserialize(&bytes).map_err(|e| {
            NamespaceError::corrupt(self.addr, format!("undecodable heap record {id}: {e}"))
        })
    }
}

impl LinkStorage for DenseStorage {
    fn form(&self) -> StorageForm {
        StorageForm::Dense
    }

    fn insert(&self, link: &Link) -> NsResult<()> {
        let bytes = self.encode(link)?;
        let id = self.store.heap_insert(self.info.heap, &bytes)?;
        if let Err(e) = self
            .store
            .index_insert(self.info.name_index, IndexKey::name(&link.name), id)
        {
            self.store.heap_remove(self.info.heap, id)?;
            return Err(match e {
                StoreError::DuplicateKey { .. } => NamespaceError::AlreadyExists {
                    name: link.name.clone(),
                },
                other => other.into(),
            });
        }
        if self.has_corder_index() {
            if let Some(corder) = link.creation_order {
                self.store
                    .index_insert(self.info.corder_index, IndexKey::CreationOrder(corder), id)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> NsResult<Option<Link>> {
        match self
            .store
            .index_find(self.info.name_index, &IndexKey::name(name))?
        {
            Some(id) => Ok(Some(self.read(id)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, name: &str) -> NsResult<Option<Link>> {
        let Some(id) = self
            .store
            .index_remove(self.info.name_index, &IndexKey::name(name))?
        else {
            return Ok(None);
        };
        let link = self.read(id)?;
        if self.has_corder_index() {
            if let Some(corder) = link.creation_order {
                self.store
                    .index_remove(self.info.corder_index, &IndexKey::CreationOrder(corder))?;
            }
        }
        self.store.heap_remove(self.info.heap, id)?;
        Ok(Some(link))
    }

    fn len(&self) -> NsResult<u64> {
        Ok(self.store.index_len(self.info.name_index)? as u64)
    }

    fn links(&self) -> NsResult<Vec<Link>> {
        let records = self.store.index_records(self.info.name_index)?;
        let mut out = Vec::new();
        out.try_reserve(records.len())?;
        for (_, id) in records {
            out.push(self.read(id)?);
        }
        Ok(out)
    }

    fn lookup_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<Link> {
        if index != IndexType::CreationOrder || !self.has_corder_index() {
            let table = self.build_table(index, order)?;
            return table.get(n).cloned();
        }
        // Served straight from the creation-order index.
        let records = self.store.index_records(self.info.corder_index)?;
        let len = records.len() as u64;
        let out_of_bounds = NamespaceError::IndexOutOfBounds { index: n, len };
        if n >= len {
            return Err(out_of_bounds);
        }
        let pos = match order {
            IterOrder::Increasing | IterOrder::Native => n,
            IterOrder::Decreasing => len - 1 - n,
        };
        let (_, id) = usize::try_from(pos)
            .ok()
            .and_then(|i| records.get(i))
            .ok_or(out_of_bounds)?;
        self.read(*id)
    }
}

/// Delete the heap and indices behind a dense group.
pub(crate) fn delete_dense(store: &dyn Store, info: &LinkInfoMessage) -> NsResult<()> {
    store.heap_delete(info.heap)?;
    store.index_delete(info.name_index)?;
    if !info.corder_index.is_undefined() {
        store.index_delete(info.corder_index)?;
    }
    Ok(())
}
