use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use hns_types::{Address, ObjectType};
use parking_lot::RwLock;

use crate::btree::IndexKey;
use crate::error::{StoreError, StoreResult};
use crate::header::{HeaderMessage, MessageKind, ObjectHeader, StoredMessage, Superblock};
use crate::heap::HeapId;
use crate::traits::{HeaderStore, HeapStore, IndexStore};

/// First address handed out; lower addresses are reserved.
const FIRST_ADDR: u64 = 0x100;

#[derive(Default)]
struct Heap {
    next_id: u64,
    records: BTreeMap<HeapId, Vec<u8>>,
}

/// In-memory store implementing every storage collaborator.
///
/// Intended for tests and embedding. Headers, heaps and indices each sit
/// behind their own `RwLock`; addresses come from one shared counter so
/// they never collide across the three spaces.
pub struct InMemoryStore {
    next_addr: AtomicU64,
    headers: RwLock<HashMap<Address, ObjectHeader>>,
    heaps: RwLock<HashMap<Address, Heap>>,
    indices: RwLock<HashMap<Address, BTreeMap<IndexKey, HeapId>>>,
    superblock: RwLock<Option<Superblock>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            next_addr: AtomicU64::new(FIRST_ADDR),
            headers: RwLock::new(HashMap::new()),
            heaps: RwLock::new(HashMap::new()),
            indices: RwLock::new(HashMap::new()),
            superblock: RwLock::new(None),
        }
    }

    fn alloc(&self) -> Address {
        Address::new(self.next_addr.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of live object headers.
    pub fn header_count(&self) -> usize {
        self.headers.read().len()
    }

    /// Number of live heaps.
    pub fn heap_count(&self) -> usize {
        self.heaps.read().len()
    }

    /// Number of live indices.
    pub fn index_count(&self) -> usize {
        self.indices.read().len()
    }

    /// Append raw, unvalidated message bytes to a header.
    ///
    /// Used to inject damaged metadata in tests.
    pub fn put_raw_message(
        &self,
        addr: Address,
        kind: MessageKind,
        bytes: Vec<u8>,
    ) -> StoreResult<()> {
        let mut headers = self.headers.write();
        let header = headers
            .get_mut(&addr)
            .ok_or(StoreError::HeaderNotFound(addr))?;
        header.messages.push(StoredMessage { kind, bytes });
        Ok(())
    }

    fn with_header<T>(
        &self,
        addr: Address,
        f: impl FnOnce(&ObjectHeader) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let headers = self.headers.read();
        let header = headers.get(&addr).ok_or(StoreError::HeaderNotFound(addr))?;
        f(header)
    }

    fn with_header_mut<T>(
        &self,
        addr: Address,
        f: impl FnOnce(&mut ObjectHeader) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut headers = self.headers.write();
        let header = headers
            .get_mut(&addr)
            .ok_or(StoreError::HeaderNotFound(addr))?;
        f(header)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderStore for InMemoryStore {
    fn create_header(&self, obj_type: ObjectType) -> StoreResult<Address> {
        let addr = self.alloc();
        self.headers.write().insert(addr, ObjectHeader::new(obj_type));
        Ok(addr)
    }

    fn delete_header(&self, addr: Address) -> StoreResult<bool> {
        Ok(self.headers.write().remove(&addr).is_some())
    }

    fn header_exists(&self, addr: Address) -> StoreResult<bool> {
        Ok(self.headers.read().contains_key(&addr))
    }

    fn object_type(&self, addr: Address) -> StoreResult<ObjectType> {
        self.with_header(addr, |h| Ok(h.obj_type))
    }

    fn header_size(&self, addr: Address) -> StoreResult<usize> {
        self.with_header(addr, |h| Ok(h.size()))
    }

    fn link_count(&self, addr: Address) -> StoreResult<u32> {
        self.with_header(addr, |h| Ok(h.link_count))
    }

    fn adjust_link_count(&self, addr: Address, delta: i32) -> StoreResult<u32> {
        self.with_header_mut(addr, |h| {
            let next = i64::from(h.link_count) + i64::from(delta);
            h.link_count = u32::try_from(next).map_err(|_| StoreError::LinkCountUnderflow(addr))?;
            Ok(h.link_count)
        })
    }

    fn message_exists(&self, addr: Address, kind: MessageKind) -> StoreResult<bool> {
        self.with_header(addr, |h| Ok(h.messages.iter().any(|m| m.kind == kind)))
    }

    fn message_read(&self, addr: Address, kind: MessageKind) -> StoreResult<HeaderMessage> {
        let stored = self.with_header(addr, |h| {
            h.messages
                .iter()
                .find(|m| m.kind == kind)
                .cloned()
                .ok_or(StoreError::MessageNotFound { addr, kind })
        })?;
        stored.decode(addr)
    }

    fn message_iterate(
        &self,
        addr: Address,
        kind: MessageKind,
        visitor: &mut dyn FnMut(&HeaderMessage) -> StoreResult<bool>,
    ) -> StoreResult<()> {
        // Snapshot first so the visitor may call back into the store.
        let stored: Vec<StoredMessage> = self.with_header(addr, |h| {
            Ok(h.messages.iter().filter(|m| m.kind == kind).cloned().collect())
        })?;
        for msg in &stored {
            if !visitor(&msg.decode(addr)?)? {
                break;
            }
        }
        Ok(())
    }

    fn message_create(&self, addr: Address, msg: &HeaderMessage) -> StoreResult<()> {
        let stored = StoredMessage::encode(msg)?;
        self.with_header_mut(addr, |h| {
            h.messages.push(stored);
            Ok(())
        })
    }

    fn message_write(&self, addr: Address, msg: &HeaderMessage) -> StoreResult<()> {
        let stored = StoredMessage::encode(msg)?;
        self.with_header_mut(addr, |h| {
            match h.messages.iter_mut().find(|m| m.kind == stored.kind) {
                Some(slot) => *slot = stored,
                None => h.messages.push(stored),
            }
            Ok(())
        })
    }

    fn message_remove(
        &self,
        addr: Address,
        kind: MessageKind,
        matches: &mut dyn FnMut(&HeaderMessage) -> bool,
    ) -> StoreResult<usize> {
        self.with_header_mut(addr, |h| {
            let mut doomed = Vec::new();
            for (i, stored) in h.messages.iter().enumerate() {
                if stored.kind == kind && matches(&stored.decode(addr)?) {
                    doomed.push(i);
                }
            }
            for i in doomed.iter().rev() {
                h.messages.remove(*i);
            }
            Ok(doomed.len())
        })
    }

    fn superblock(&self) -> StoreResult<Superblock> {
        self.superblock
            .read()
            .clone()
            .ok_or(StoreError::SuperblockMissing)
    }

    fn write_superblock(&self, sb: &Superblock) -> StoreResult<()> {
        *self.superblock.write() = Some(sb.clone());
        Ok(())
    }
}

impl HeapStore for InMemoryStore {
    fn heap_create(&self) -> StoreResult<Address> {
        let addr = self.alloc();
        self.heaps.write().insert(addr, Heap::default());
        Ok(addr)
    }

    fn heap_insert(&self, heap: Address, bytes: &[u8]) -> StoreResult<HeapId> {
        let mut heaps = self.heaps.write();
        let h = heaps.get_mut(&heap).ok_or(StoreError::HeapNotFound(heap))?;
        let id = HeapId::new(h.next_id);
        h.next_id += 1;
        h.records.insert(id, bytes.to_vec());
        Ok(id)
    }

    fn heap_read(&self, heap: Address, id: HeapId) -> StoreResult<Vec<u8>> {
        let heaps = self.heaps.read();
        let h = heaps.get(&heap).ok_or(StoreError::HeapNotFound(heap))?;
        h.records
            .get(&id)
            .cloned()
            .ok_or(StoreError::HeapRecordNotFound { heap, id: id.get() })
    }

    fn heap_remove(&self, heap: Address, id: HeapId) -> StoreResult<()> {
        let mut heaps = self.heaps.write();
        let h = heaps.get_mut(&heap).ok_or(StoreError::HeapNotFound(heap))?;
        h.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::HeapRecordNotFound { heap, id: id.get() })
    }

    fn heap_len(&self, heap: Address) -> StoreResult<usize> {
        let heaps = self.heaps.read();
        let h = heaps.get(&heap).ok_or(StoreError::HeapNotFound(heap))?;
        Ok(h.records.len())
    }

    fn heap_delete(&self, heap: Address) -> StoreResult<bool> {
        Ok(self.heaps.write().remove(&heap).is_some())
    }
}

impl IndexStore for InMemoryStore {
    fn index_create(&self) -> StoreResult<Address> {
        let addr = self.alloc();
        self.indices.write().insert(addr, BTreeMap::new());
        Ok(addr)
    }

    fn index_insert(&self, index: Address, key: IndexKey, id: HeapId) -> StoreResult<()> {
        let mut indices = self.indices.write();
        let tree = indices
            .get_mut(&index)
            .ok_or(StoreError::IndexNotFound(index))?;
        if tree.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                index,
                key: key.to_string(),
            });
        }
        tree.insert(key, id);
        Ok(())
    }

    fn index_find(&self, index: Address, key: &IndexKey) -> StoreResult<Option<HeapId>> {
        let indices = self.indices.read();
        let tree = indices.get(&index).ok_or(StoreError::IndexNotFound(index))?;
        Ok(tree.get(key).copied())
    }

    fn index_remove(&self, index: Address, key: &IndexKey) -> StoreResult<Option<HeapId>> {
        let mut indices = self.indices.write();
        let tree = indices
            .get_mut(&index)
            .ok_or(StoreError::IndexNotFound(index))?;
        Ok(tree.remove(key))
    }

    fn index_records(&self, index: Address) -> StoreResult<Vec<(IndexKey, HeapId)>> {
        let indices = self.indices.read();
        let tree = indices.get(&index).ok_or(StoreError::IndexNotFound(index))?;
        Ok(tree.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    fn index_len(&self, index: Address) -> StoreResult<usize> {
        let indices = self.indices.read();
        let tree = indices.get(&index).ok_or(StoreError::IndexNotFound(index))?;
        Ok(tree.len())
    }

    fn index_delete(&self, index: Address) -> StoreResult<bool> {
        Ok(self.indices.write().remove(&index).is_some())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("headers", &self.header_count())
            .field("heaps", &self.heap_count())
            .field("indices", &self.index_count())
            .finish()
    }
}
