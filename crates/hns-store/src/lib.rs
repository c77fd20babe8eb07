//! Storage collaborators for the hierarchical namespace engine.
//!
//! The namespace engine never touches bytes directly. It talks to three
//! storage interfaces and one cache:
//!
//! - [`HeaderStore`] -- object headers holding typed messages (link-info,
//!   group-info, link, pipeline) plus each object's hard-link count
//! - [`HeapStore`] -- variable-length records backing dense link storage
//! - [`IndexStore`] -- sorted indices over heap records, keyed by name hash
//!   or creation order
//! - [`MetadataCache`] -- protect/unprotect pinning, dirty tracking,
//!   corking and tag-based flush/evict
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store implementing all three
//!   interfaces, for tests and embedding
//!
//! # Design Rules
//!
//! 1. Messages are stored encoded and decoded on every read.
//! 2. A message that fails to decode is an error, never skipped.
//! 3. The store never interprets link semantics; that is the engine's job.

pub mod btree;
pub mod cache;
pub mod error;
pub mod header;
pub mod heap;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use btree::{name_hash, IndexKey};
pub use cache::{CacheStats, MetadataCache, DEFAULT_METADATA_CACHE_BYTES};
pub use error::{StoreError, StoreResult};
pub use header::{
    Filter, GroupInfoMessage, HeaderMessage, LinkInfoMessage, MessageKind, ObjectHeader,
    PipelineMessage, RootHint, StoredMessage, Superblock, SUPERBLOCK_ADDR,
};
pub use heap::HeapId;
pub use memory::InMemoryStore;
pub use traits::{HeaderStore, HeapStore, IndexStore, Store};
