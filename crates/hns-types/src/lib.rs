//! Foundation types for the hierarchical namespace engine (HNS).
//!
//! This crate provides the identity and record types shared by the object
//! store and the namespace engine. Every other HNS crate depends on
//! `hns-types`.
//!
//! # Key Types
//!
//! - [`Address`]: Persistent address of an object header inside a container
//! - [`ContainerId`]: Identity of one open container session
//! - [`Link`]: A named edge from a group to a target
//! - [`LinkTarget`]: What a link points to: hard, soft, external, or user-defined
//! - [`IndexType`] / [`IterOrder`]: How links are ordered for lookup and iteration
//! - [`ObjectType`]: Basic type of the object behind an address

pub mod address;
pub mod container;
pub mod error;
pub mod index;
pub mod link;
pub mod object;

pub use address::Address;
pub use container::ContainerId;
pub use error::TypeError;
pub use index::{IndexType, IterOrder};
pub use link::{CharSet, Link, LinkClassId, LinkKind, LinkTarget};
pub use object::ObjectType;
