use hns_types::{Address, ObjectType};

use crate::btree::IndexKey;
use crate::error::StoreResult;
use crate::header::{HeaderMessage, MessageKind, Superblock};
use crate::heap::HeapId;

/// Object-header message store.
///
/// All implementations must satisfy these invariants:
/// - Messages of one kind are returned in the order they were created.
/// - A message that cannot be decoded is reported, never skipped.
/// - Deleting a header deletes its messages; it does not touch heaps or
///   indices the messages point to.
pub trait HeaderStore: Send + Sync {
    /// Allocate a new, empty object header with a zero hard-link count.
    fn create_header(&self, obj_type: ObjectType) -> StoreResult<Address>;

    /// Delete an object header. Returns `true` if it existed.
    fn delete_header(&self, addr: Address) -> StoreResult<bool>;

    /// Check whether an object header exists.
    fn header_exists(&self, addr: Address) -> StoreResult<bool>;

    /// The type of the object behind `addr`.
    fn object_type(&self, addr: Address) -> StoreResult<ObjectType>;

    /// Encoded size of the header, used to size cache entries.
    fn header_size(&self, addr: Address) -> StoreResult<usize>;

    /// The object's hard-link count.
    fn link_count(&self, addr: Address) -> StoreResult<u32>;

    /// Add `delta` to the hard-link count and return the new count.
    fn adjust_link_count(&self, addr: Address, delta: i32) -> StoreResult<u32>;

    /// Check whether the header carries a message of `kind`.
    fn message_exists(&self, addr: Address, kind: MessageKind) -> StoreResult<bool>;

    /// Read the first message of `kind`.
    ///
    /// Returns `Err(MessageNotFound)` if there is none.
    fn message_read(&self, addr: Address, kind: MessageKind) -> StoreResult<HeaderMessage>;

    /// Visit every message of `kind` in creation order. The visitor returns
    /// `false` to stop early.
    fn message_iterate(
        &self,
        addr: Address,
        kind: MessageKind,
        visitor: &mut dyn FnMut(&HeaderMessage) -> StoreResult<bool>,
    ) -> StoreResult<()>;

    /// Append a message to the header.
    fn message_create(&self, addr: Address, msg: &HeaderMessage) -> StoreResult<()>;

    /// Replace the first message of the same kind, or append it if the
    /// header has none.
    fn message_write(&self, addr: Address, msg: &HeaderMessage) -> StoreResult<()>;

    /// Remove every message of `kind` for which `matches` returns `true`.
    /// Returns the number removed.
    fn message_remove(
        &self,
        addr: Address,
        kind: MessageKind,
        matches: &mut dyn FnMut(&HeaderMessage) -> bool,
    ) -> StoreResult<usize>;

    /// Read the superblock.
    fn superblock(&self) -> StoreResult<Superblock>;

    /// Write the superblock.
    fn write_superblock(&self, sb: &Superblock) -> StoreResult<()>;

    /// Read every message of `kind` into a vector.
    fn messages(&self, addr: Address, kind: MessageKind) -> StoreResult<Vec<HeaderMessage>> {
        let mut out = Vec::new();
        self.message_iterate(addr, kind, &mut |msg| {
            out.push(msg.clone());
            Ok(true)
        })?;
        Ok(out)
    }

    /// Count the messages of `kind`.
    fn message_count(&self, addr: Address, kind: MessageKind) -> StoreResult<usize> {
        let mut count = 0;
        self.message_iterate(addr, kind, &mut |_| {
            count += 1;
            Ok(true)
        })?;
        Ok(count)
    }
}

/// Heap of variable-length records addressed by [`HeapId`].
pub trait HeapStore: Send + Sync {
    /// Allocate an empty heap.
    fn heap_create(&self) -> StoreResult<Address>;

    /// Store a record and return its id.
    fn heap_insert(&self, heap: Address, bytes: &[u8]) -> StoreResult<HeapId>;

    /// Read a record.
    fn heap_read(&self, heap: Address, id: HeapId) -> StoreResult<Vec<u8>>;

    /// Remove a record.
    fn heap_remove(&self, heap: Address, id: HeapId) -> StoreResult<()>;

    /// Number of records in the heap.
    fn heap_len(&self, heap: Address) -> StoreResult<usize>;

    /// Delete a heap and all its records. Returns `true` if it existed.
    fn heap_delete(&self, heap: Address) -> StoreResult<bool>;
}

/// Sorted index mapping [`IndexKey`]s to heap records.
pub trait IndexStore: Send + Sync {
    /// Allocate an empty index.
    fn index_create(&self) -> StoreResult<Address>;

    /// Insert a key. Fails with `DuplicateKey` if it is already present.
    fn index_insert(&self, index: Address, key: IndexKey, id: HeapId) -> StoreResult<()>;

    /// Find the record stored under `key`.
    fn index_find(&self, index: Address, key: &IndexKey) -> StoreResult<Option<HeapId>>;

    /// Remove `key`, returning the record it pointed to.
    fn index_remove(&self, index: Address, key: &IndexKey) -> StoreResult<Option<HeapId>>;

    /// All records in key order.
    fn index_records(&self, index: Address) -> StoreResult<Vec<(IndexKey, HeapId)>>;

    /// Number of records in the index.
    fn index_len(&self, index: Address) -> StoreResult<usize>;

    /// Delete an index. Returns `true` if it existed.
    fn index_delete(&self, index: Address) -> StoreResult<bool>;
}

/// Everything the namespace engine needs from persistent storage.
pub trait Store: HeaderStore + HeapStore + IndexStore {}

impl<T: HeaderStore + HeapStore + IndexStore> Store for T {}
