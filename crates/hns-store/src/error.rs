use hns_types::Address;

use crate::header::MessageKind;

/// Errors from the storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object header lives at this address.
    #[error("object header not found: {0}")]
    HeaderNotFound(Address),

    /// The header exists but carries no message of the requested kind.
    #[error("no {kind} message in object header {addr}")]
    MessageNotFound { addr: Address, kind: MessageKind },

    /// A stored message could not be decoded.
    #[error("corrupt {kind} message in object header {addr}: {reason}")]
    CorruptMessage {
        addr: Address,
        kind: MessageKind,
        reason: String,
    },

    /// Serialization failure while encoding a message.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Decrementing a hard-link count below zero.
    #[error("link count underflow for object {0}")]
    LinkCountUnderflow(Address),

    /// No heap lives at this address.
    #[error("heap not found: {0}")]
    HeapNotFound(Address),

    /// The heap exists but has no record with this id.
    #[error("heap record {id} not found in heap {heap}")]
    HeapRecordNotFound { heap: Address, id: u64 },

    /// No index lives at this address.
    #[error("index not found: {0}")]
    IndexNotFound(Address),

    /// The key is already present in the index.
    #[error("duplicate key {key} in index {index}")]
    DuplicateKey { index: Address, key: String },

    /// A metadata cache entry is pinned and cannot be evicted or unpinned.
    #[error("cache entry {0} is protected")]
    EntryProtected(Address),

    /// Unprotecting an entry that was never protected.
    #[error("cache entry {0} is not protected")]
    EntryNotProtected(Address),

    /// The superblock has not been written yet.
    #[error("superblock missing")]
    SuperblockMissing,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
