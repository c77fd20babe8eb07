//! The per-container open-object registry.
//!
//! Every open handle to an object shares one [`Descriptor`] with all other
//! handles to the same address in the same container. The registry hands
//! descriptors out and takes them back; it is the only place reference
//! counts change, and it is always used under the container's registry lock
//! so open, close and count changes are atomic with respect to each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hns_types::{Address, ObjectType};

use crate::error::{NamespaceError, NsResult};

/// Shared state of one open object.
#[derive(Debug)]
pub struct Descriptor {
    addr: Address,
    obj_type: ObjectType,
    count: AtomicUsize,
    mounted: AtomicBool,
    pinned: bool,
}

impl Descriptor {
    fn new(addr: Address, obj_type: ObjectType, count: usize, pinned: bool) -> Self {
        Self {
            addr,
            obj_type,
            count: AtomicUsize::new(count),
            mounted: AtomicBool::new(false),
            pinned,
        }
    }

    /// Address of the object.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// Type of the object.
    pub fn obj_type(&self) -> ObjectType {
        self.obj_type
    }

    /// Number of open handles sharing this descriptor.
    pub fn ref_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns `true` if another container is mounted on this group.
    pub fn is_mount_point(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Returns `true` for the root descriptor, which outlives its handles.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub(crate) fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::Release);
    }
}

/// What happened when a handle was given back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Release {
    /// Other handles remain.
    Open(usize),
    /// The last handle to the root closed; the descriptor stays.
    Pinned,
    /// The last handle closed and the descriptor was dropped.
    Last,
}

#[derive(Debug, Default)]
pub(crate) struct OpenRegistry {
    entries: HashMap<Address, Arc<Descriptor>>,
}

impl OpenRegistry {
    /// Share the descriptor at `addr`, or create one with a count of 1.
    pub(crate) fn acquire(&mut self, addr: Address, obj_type: ObjectType) -> Arc<Descriptor> {
        let desc = self
            .entries
            .entry(addr)
            .or_insert_with(|| Arc::new(Descriptor::new(addr, obj_type, 0, false)));
        desc.count.fetch_add(1, Ordering::AcqRel);
        Arc::clone(desc)
    }

    /// Install the root descriptor with no handles.
    pub(crate) fn install_root(&mut self, addr: Address) -> Arc<Descriptor> {
        let desc = Arc::new(Descriptor::new(addr, ObjectType::Group, 0, true));
        self.entries.insert(addr, Arc::clone(&desc));
        desc
    }

    /// Give one handle back.
    pub(crate) fn release(&mut self, addr: Address) -> NsResult<Release> {
        let desc = self
            .entries
            .get(&addr)
            .ok_or_else(|| NamespaceError::InvalidArgument(format!("object {addr} is not open")))?;
        let count = desc.ref_count();
        if count == 0 {
            return Err(NamespaceError::InvalidArgument(format!(
                "object {addr} has no open handles"
            )));
        }
        desc.count.store(count - 1, Ordering::Release);
        if count > 1 {
            Ok(Release::Open(count - 1))
        } else if desc.pinned {
            Ok(Release::Pinned)
        } else {
            self.entries.remove(&addr);
            Ok(Release::Last)
        }
    }

    /// Drop a descriptor regardless of its count. Used for the root at
    /// container close.
    pub(crate) fn remove(&mut self, addr: Address) -> Option<Arc<Descriptor>> {
        self.entries.remove(&addr)
    }

    pub(crate) fn get(&self, addr: Address) -> Option<&Arc<Descriptor>> {
        self.entries.get(&addr)
    }

    /// Number of open handles to `addr`.
    pub(crate) fn ref_count(&self, addr: Address) -> usize {
        self.entries.get(&addr).map_or(0, |d| d.ref_count())
    }

    /// Returns `true` if at least one handle to `addr` is open.
    pub(crate) fn is_open(&self, addr: Address) -> bool {
        self.ref_count(addr) > 0
    }

    /// Total open handles across all objects.
    pub(crate) fn handles(&self) -> usize {
        self.entries.values().map(|d| d.ref_count()).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::new(n)
    }

    #[test]
    fn acquire_shares_one_descriptor() {
        let mut reg = OpenRegistry::default();
        let a = reg.acquire(addr(1), ObjectType::Group);
        let b = reg.acquire(addr(1), ObjectType::Group);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ref_count(), 2);
        assert_eq!(reg.handles(), 2);
    }

    #[test]
    fn release_tears_down_at_zero() {
        let mut reg = OpenRegistry::default();
        reg.acquire(addr(1), ObjectType::Dataset);
        reg.acquire(addr(1), ObjectType::Dataset);

        assert_eq!(reg.release(addr(1)).unwrap(), Release::Open(1));
        assert_eq!(reg.release(addr(1)).unwrap(), Release::Last);
        assert!(reg.get(addr(1)).is_none());
        assert!(reg.release(addr(1)).is_err());
    }

    #[test]
    fn root_descriptor_is_pinned() {
        let mut reg = OpenRegistry::default();
        let root = reg.install_root(addr(7));
        assert_eq!(root.ref_count(), 0);
        assert!(root.is_pinned());

        let again = reg.acquire(addr(7), ObjectType::Group);
        assert!(Arc::ptr_eq(&root, &again));
        assert_eq!(reg.release(addr(7)).unwrap(), Release::Pinned);
        assert!(reg.get(addr(7)).is_some());
        assert!(!reg.is_open(addr(7)));

        // Releasing an unheld root is an error, not an underflow.
        assert!(reg.release(addr(7)).is_err());
        assert!(reg.remove(addr(7)).is_some());
    }

    #[test]
    fn mount_flag_is_shared() {
        let mut reg = OpenRegistry::default();
        let a = reg.acquire(addr(3), ObjectType::Group);
        let b = reg.acquire(addr(3), ObjectType::Group);
        a.set_mounted(true);
        assert!(b.is_mount_point());
    }
}
