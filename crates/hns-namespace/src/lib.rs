//! Hierarchical namespace engine.
//!
//! A [`Container`] holds objects addressed by [`Address`]. Groups are
//! objects that hold named links, and links tie the namespace together:
//!
//! - **Hard** links point at an object in the same container and keep it
//!   alive. An object is deleted when its last hard link goes away and no
//!   handle to it is open.
//! - **Soft** links hold a path that is resolved when the link is followed.
//! - **External** links name a path inside another container, found through
//!   a [`ContainerCatalog`].
//! - **User-defined** links are resolved by a [`LinkClass`] registered with
//!   a [`LinkClassRegistry`].
//!
//! A group keeps its links in its header while it is small (compact
//! storage) and moves them to a heap with name and creation-order indexes
//! once it grows (dense storage). The switch happens automatically in both
//! directions with hysteresis set by the group's thresholds.
//!
//! Containers can be mounted on groups of other containers. Paths cross
//! mount points transparently and absolute paths always start at the root
//! of the outermost container.
//!
//! # Modules
//!
//! - [`container`]: containers, their lifecycle and open-object registry
//! - [`group`] and [`object`]: handles to open objects
//! - [`links`]: creating, removing, moving and querying links
//! - [`traverse`]: path resolution with a bounded link-hop budget
//! - [`visit`]: ordered iteration and cycle-safe recursive visitation
//! - [`mount`]: mounting containers on groups
//! - [`storage`], [`compact`], [`dense`]: the two link storage forms
//! - [`config`]: container defaults and creation properties

pub mod compact;
pub mod config;
pub mod container;
pub mod dense;
pub mod error;
pub mod group;
pub mod link;
pub mod link_class;
pub mod links;
mod linkset;
pub mod location;
pub mod mount;
pub mod object;
pub mod registry;
mod root;
mod special;
pub mod storage;
pub mod table;
pub mod traverse;
pub mod visit;

pub use compact::CompactStorage;
pub use config::{Access, GroupCreateProps, LinkCreateProps, NamespaceConfig};
pub use container::{Container, ContainerBuilder, ContainerState, WeakContainer};
pub use dense::DenseStorage;
pub use error::{NamespaceError, NsResult};
pub use group::{Group, GroupInfo};
pub use link::{IterStep, LinkInfo, LinkValue, TargetInfo};
pub use link_class::{ContainerCatalog, InMemoryCatalog, LinkClass, LinkClassRegistry};
pub use location::Location;
pub use object::Object;
pub use registry::Descriptor;
pub use storage::{LinkStorage, StorageForm};
pub use table::LinkTable;
pub use traverse::{Resolved, TraverseCtx, TraverseFlags};

pub use hns_types::{
    Address, CharSet, ContainerId, IndexType, IterOrder, Link, LinkClassId, LinkKind, LinkTarget,
    ObjectType,
};
