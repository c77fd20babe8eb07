//! Open handles and object deletion.

use std::fmt;
use std::sync::Arc;

use hns_store::{HeaderStore, MessageKind};
use hns_types::{Address, IndexType, IterOrder, ObjectType};
use tracing::{debug, trace, warn};

use crate::container::Container;
use crate::error::NsResult;
use crate::linkset;
use crate::location::Location;
use crate::registry::Descriptor;

/// One counted reference to an open object.
///
/// Opening a handle shares the container's descriptor for the address and
/// bumps its count; releasing gives the count back exactly once. A handle
/// dropped without an explicit release is released on drop.
pub(crate) struct Handle {
    loc: Location,
    desc: Arc<Descriptor>,
    released: bool,
}

impl Handle {
    pub(crate) fn open(loc: Location, obj_type: ObjectType) -> NsResult<Self> {
        let desc = loc.container.acquire(loc.addr, obj_type)?;
        Ok(Self {
            loc,
            desc,
            released: false,
        })
    }

    pub(crate) fn location(&self) -> &Location {
        &self.loc
    }

    pub(crate) fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    /// A second handle to the same object.
    pub(crate) fn reopen(&self) -> NsResult<Self> {
        Self::open(self.loc.duplicate(), self.desc.obj_type())
    }

    pub(crate) fn release(&mut self) -> NsResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.loc.container.release(&self.desc)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(addr = %self.loc.addr, error = %e, "failed to release handle on drop");
        }
    }
}

/// An open handle to an object of any type.
pub struct Object {
    handle: Handle,
}

impl Object {
    /// Open the object at `loc`.
    pub fn open(loc: Location) -> NsResult<Self> {
        loc.container.ensure_open()?;
        let obj_type = loc.container.store().object_type(loc.addr)?;
        Ok(Self {
            handle: Handle::open(loc, obj_type)?,
        })
    }

    pub fn obj_type(&self) -> ObjectType {
        self.handle.descriptor().obj_type()
    }

    pub fn location(&self) -> &Location {
        self.handle.location()
    }

    pub fn addr(&self) -> Address {
        self.handle.location().addr()
    }

    pub fn container(&self) -> &Container {
        self.handle.location().container()
    }

    /// Open handles to this object, this one included.
    pub fn ref_count(&self) -> usize {
        self.handle.descriptor().ref_count()
    }

    /// Hard links pointing at this object.
    pub fn link_count(&self) -> NsResult<u32> {
        Ok(self.container().store().link_count(self.addr())?)
    }

    /// Close this handle.
    pub fn close(mut self) -> NsResult<()> {
        self.handle.release()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("location", self.location())
            .field("obj_type", &self.obj_type())
            .finish()
    }
}

/// Delete the object at `addr`, releasing every hard link it holds.
///
/// Groups give up their links (and dense storage) first; each hard target
/// then loses one link and is deleted in turn if that was its last.
pub(crate) fn delete_object(c: &Container, addr: Address) -> NsResult<()> {
    let store = c.store();
    if !store.header_exists(addr)? {
        return Ok(());
    }
    let mut targets = Vec::new();
    if store.object_type(addr)? == ObjectType::Group
        && store.message_exists(addr, MessageKind::LinkInfo)?
    {
        let table = linkset::build_table(c, addr, IndexType::Name, IterOrder::Native)?;
        targets.extend(table.iter().filter_map(|l| l.hard_target()));
        linkset::delete_storage(c, addr)?;
    }
    store.delete_header(addr)?;
    match c.cache().evict_tagged(addr) {
        Ok(evicted) => trace!(addr = %addr, evicted, "cache entries evicted"),
        Err(e) => debug!(addr = %addr, error = %e, "cache entries left resident"),
    }
    debug!(addr = %addr, links = targets.len(), "object deleted");

    for target in targets {
        unlink_target(c, target)?;
    }
    Ok(())
}

/// Drop one hard link to `addr`, deleting the object if it was the last
/// link and nothing holds the object open.
pub(crate) fn unlink_target(c: &Container, addr: Address) -> NsResult<()> {
    let store = c.store();
    // Already gone when a cycle led back to an object being deleted.
    if !store.header_exists(addr)? {
        return Ok(());
    }
    let remaining = store.adjust_link_count(addr, -1)?;
    if remaining > 0 {
        return Ok(());
    }
    if c.is_object_open(addr) {
        debug!(addr = %addr, "last link removed from open object; deletion deferred");
        return Ok(());
    }
    delete_object(c, addr)
}

/// Delete a freshly created object that never got linked.
pub(crate) fn delete_if_orphan(c: &Container, addr: Address) -> NsResult<()> {
    let store = c.store();
    if store.header_exists(addr)? && store.link_count(addr)? == 0 && !c.is_object_open(addr) {
        delete_object(c, addr)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;

    fn setup() -> (Container, Group) {
        let c = Container::in_memory("objects").unwrap();
        let root = c.root().unwrap();
        (c, root)
    }

    // ---- Test 1: Handles share one descriptor ----
    #[test]
    fn handles_share_descriptor() {
        let (c, root) = setup();
        let obj = root.create_object("d", ObjectType::Dataset).unwrap();
        let again = root.open_object("d").unwrap();
        assert_eq!(obj.ref_count(), 2);
        assert_eq!(c.ref_count(obj.addr()), 2);
        again.close().unwrap();
        assert_eq!(obj.ref_count(), 1);
        let addr = obj.addr();
        obj.close().unwrap();
        assert!(!c.is_object_open(addr));
    }

    // ---- Test 2: Drop releases the handle ----
    #[test]
    fn drop_releases() {
        let (c, root) = setup();
        let addr = {
            let obj = root.create_object("d", ObjectType::Dataset).unwrap();
            obj.addr()
        };
        assert_eq!(c.ref_count(addr), 0);
    }

    // ---- Test 3: Deleting a group releases its children ----
    #[test]
    fn delete_group_releases_children() {
        let (c, root) = setup();
        assert!(root.create_group("a/b/c").unwrap_err().is_not_found());
        let a = root.create_group("a").unwrap();
        let b = a.create_group("b").unwrap();
        let d = b.create_object("d", ObjectType::Dataset).unwrap();
        let (a_addr, b_addr, d_addr) = (a.addr(), b.addr(), d.addr());
        a.close().unwrap();
        b.close().unwrap();
        d.close().unwrap();

        root.remove("a").unwrap();
        let store = c.store();
        for addr in [a_addr, b_addr, d_addr] {
            assert!(!store.header_exists(addr).unwrap(), "{addr} survived");
        }
    }

    // ---- Test 4: Shared children survive while linked elsewhere ----
    #[test]
    fn shared_child_survives() {
        let (c, root) = setup();
        let a = root.create_group("a").unwrap();
        let d = a.create_object("d", ObjectType::Dataset).unwrap();
        root.link_object("d2", d.location()).unwrap();
        let d_addr = d.addr();
        a.close().unwrap();
        d.close().unwrap();

        root.remove("a").unwrap();
        assert!(c.store().header_exists(d_addr).unwrap());
        assert_eq!(c.store().link_count(d_addr).unwrap(), 1);
    }

    // ---- Test 5: Deleting the last link of an open object defers deletion ----
    #[test]
    fn deferred_delete_waits_for_last_handle() {
        let (c, root) = setup();
        let d = root.create_object("d", ObjectType::Dataset).unwrap();
        let extra = root.open_object("d").unwrap();
        let addr = d.addr();

        root.remove("d").unwrap();
        assert_eq!(c.store().link_count(addr).unwrap(), 0);
        assert!(c.store().header_exists(addr).unwrap());

        d.close().unwrap();
        assert!(c.store().header_exists(addr).unwrap());
        extra.close().unwrap();
        assert!(!c.store().header_exists(addr).unwrap());
    }
}
