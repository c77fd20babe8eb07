//! Mounting one container on a group of another.
//!
//! A mount holds one handle to the mount-point group, so the group's
//! descriptor outlives every other handle to it while the mount exists.
//! The child keeps a weak reference to its parent; the parent owns the
//! child through its mount table.

use std::sync::Arc;

use hns_store::HeaderStore;
use hns_types::ObjectType;
use tracing::info;

use crate::container::Container;
use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::location::Location;
use crate::registry::Descriptor;
use crate::traverse::{traverse, TraverseFlags};

/// One entry in a container's mount table.
pub(crate) struct MountEntry {
    pub(crate) desc: Arc<Descriptor>,
    pub(crate) child: Container,
}

impl MountEntry {
    /// Unlink the child from its parent. The mount-point handle is not
    /// released here.
    pub(crate) fn detach(&self) {
        self.desc.set_mounted(false);
        *self.child.inner.parent.lock() = None;
    }
}

impl Container {
    /// The container this one is mounted in, if any.
    pub fn parent(&self) -> Option<Container> {
        self.inner
            .parent
            .lock()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(Container::from_inner)
    }

    /// Returns `true` while this container is mounted in another.
    pub fn is_mounted(&self) -> bool {
        self.parent().is_some()
    }

    /// The container mounted on the group at `addr`, if any.
    pub fn mounted_child(&self, addr: hns_types::Address) -> Option<Container> {
        self.inner.mounts.lock().get(&addr).map(|m| m.child.clone())
    }

    /// Number of containers mounted directly in this one.
    pub fn mount_count(&self) -> usize {
        self.inner.mounts.lock().len()
    }
}

impl Group {
    /// Mount `child` on the group at `path`.
    ///
    /// Fails with `MountBusy` if the group already has a mount, if `child`
    /// is already mounted somewhere, or if the mount would make a container
    /// its own ancestor.
    pub fn mount(&self, path: &str, child: &Container) -> NsResult<()> {
        child.ensure_open()?;
        let mut ctx = self.traverse_ctx();
        traverse(
            self.location(),
            path,
            TraverseFlags::STOP_AT_LAST_MOUNT_POINT,
            &mut ctx,
            |r| {
                let target = r.obj.ok_or_else(|| NamespaceError::not_found(&r.name))?;
                mount_at(target, child)
            },
        )
    }

    /// Unmount whatever is mounted on the group at `path`.
    pub fn unmount(&self, path: &str) -> NsResult<()> {
        let mut ctx = self.traverse_ctx();
        let (parent, entry) = traverse(
            self.location(),
            path,
            TraverseFlags::STOP_AT_LAST_MOUNT_POINT,
            &mut ctx,
            |r| {
                let target = r.obj.ok_or_else(|| NamespaceError::not_found(&r.name))?;
                let entry = target
                    .container
                    .inner
                    .mounts
                    .lock()
                    .remove(&target.addr)
                    .ok_or_else(|| NamespaceError::NotMounted(path.to_string()))?;
                Ok((target.container, entry))
            },
        )?;
        entry.detach();
        info!(
            parent = %parent.id(),
            child = %entry.child.id(),
            addr = %entry.desc.addr(),
            "container unmounted"
        );
        parent.release(&entry.desc)?;
        entry.child.try_close()?;
        Ok(())
    }
}

fn mount_at(target: Location, child: &Container) -> NsResult<()> {
    let parent = target.container;
    parent.ensure_open()?;
    if parent.ptr_eq(child) {
        return Err(NamespaceError::MountBusy(
            "a container cannot be mounted on itself".into(),
        ));
    }
    if child.is_mounted() {
        return Err(NamespaceError::MountBusy(format!(
            "container {} is already mounted",
            child.name()
        )));
    }
    let mut ancestor = parent.parent();
    while let Some(a) = ancestor {
        if a.ptr_eq(child) {
            return Err(NamespaceError::MountBusy(format!(
                "container {} is an ancestor of the mount point",
                child.name()
            )));
        }
        ancestor = a.parent();
    }
    let obj_type = parent.store().object_type(target.addr)?;
    if obj_type != ObjectType::Group {
        return Err(NamespaceError::wrong_type(
            target.path.unwrap_or_else(|| target.addr.to_string()),
            format!("cannot mount on a {obj_type}"),
        ));
    }
    if parent.inner.mounts.lock().contains_key(&target.addr) {
        return Err(NamespaceError::MountBusy(format!(
            "group {} already has a mount",
            target.addr
        )));
    }

    let desc = parent.acquire(target.addr, ObjectType::Group)?;
    desc.set_mounted(true);
    *child.inner.parent.lock() = Some(Arc::downgrade(&parent.inner));
    parent.inner.mounts.lock().insert(
        target.addr,
        MountEntry {
            desc,
            child: child.clone(),
        },
    );
    info!(
        parent = %parent.id(),
        child = %child.id(),
        addr = %target.addr,
        "container mounted"
    );
    Ok(())
}

/// Follow mounts from `loc` down to the root of the innermost container
/// mounted there.
pub(crate) fn cross_into(mut loc: Location) -> NsResult<Location> {
    while let Some(child) = loc.container.mounted_child(loc.addr) {
        let root = child.root_addr()?;
        loc = Location::new(child, root, loc.path);
    }
    Ok(loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerState;

    fn pair() -> (Container, Group, Container) {
        let parent = Container::in_memory("parent").unwrap();
        let root = parent.root().unwrap();
        root.create_group("mnt").unwrap();
        let child = Container::in_memory("child").unwrap();
        let child_root = child.root().unwrap();
        child_root
            .create_object("inside", ObjectType::Dataset)
            .unwrap();
        child_root.create_group("sub").unwrap();
        (parent, root, child)
    }

    // ---- Test 1: Paths cross into the mounted container ----
    #[test]
    fn paths_cross_mount() {
        let (parent, root, child) = pair();
        root.mount("mnt", &child).unwrap();
        assert!(child.is_mounted());
        assert_eq!(parent.mount_count(), 1);

        let obj = root.open_object("/mnt/inside").unwrap();
        assert!(obj.container().ptr_eq(&child));
        let mnt = root.open_group("mnt").unwrap();
        assert!(mnt.container().ptr_eq(&child));
        assert!(root.info_by_name("/mnt/sub").is_ok());
    }

    // ---- Test 2: Absolute paths inside the child start at the top root ----
    #[test]
    fn absolute_paths_rerooted() {
        let (_parent, root, child) = pair();
        root.create_group("top").unwrap();
        root.mount("mnt", &child).unwrap();
        let sub = root.open_group("/mnt/sub").unwrap();
        let top = sub.open_group("/top").unwrap();
        assert!(top.container().ptr_eq(root.container()));
    }

    // ---- Test 3: The mount holds the mount point open ----
    #[test]
    fn mount_holds_mount_point() {
        let (parent, root, child) = pair();
        let mnt = root.open_group("mnt").unwrap();
        let addr = mnt.addr();
        mnt.close().unwrap();
        assert_eq!(parent.ref_count(addr), 0);

        root.mount("mnt", &child).unwrap();
        assert_eq!(parent.ref_count(addr), 1);
        assert!(parent.descriptor(addr).unwrap().is_mount_point());
        assert!(root.info_by_name("mnt").is_ok());
        let info = parent
            .root()
            .unwrap()
            .info()
            .unwrap();
        assert!(!info.mounted);

        root.unmount("mnt").unwrap();
        assert_eq!(parent.ref_count(addr), 0);
        assert!(!child.is_mounted());
    }

    // ---- Test 4: Busy mounts are rejected ----
    #[test]
    fn busy_mounts_rejected() {
        let (parent, root, child) = pair();
        root.create_group("other").unwrap();
        assert!(matches!(
            root.mount("mnt", &parent),
            Err(NamespaceError::MountBusy(_))
        ));
        root.mount("mnt", &child).unwrap();
        assert!(matches!(
            root.mount("other", &child),
            Err(NamespaceError::MountBusy(_))
        ));
        let third = Container::in_memory("third").unwrap();
        assert!(matches!(
            root.mount("mnt", &third),
            Err(NamespaceError::MountBusy(_))
        ));
        // parent would become its own ancestor
        let child_root = child.root().unwrap();
        assert!(matches!(
            child_root.mount("sub", &parent),
            Err(NamespaceError::MountBusy(_))
        ));
    }

    // ---- Test 5: Only groups can be mount points ----
    #[test]
    fn mount_on_non_group() {
        let (_parent, root, child) = pair();
        root.create_object("d", ObjectType::Dataset).unwrap();
        assert!(matches!(
            root.mount("d", &child),
            Err(NamespaceError::WrongType { .. })
        ));
        assert!(root.mount("missing", &child).unwrap_err().is_not_found());
    }

    // ---- Test 6: Unmounting an unmounted group ----
    #[test]
    fn unmount_not_mounted() {
        let (_parent, root, _child) = pair();
        assert!(matches!(
            root.unmount("mnt"),
            Err(NamespaceError::NotMounted(_))
        ));
    }

    // ---- Test 7: Closing a mounted child waits for the unmount ----
    #[test]
    fn child_close_deferred_until_unmount() {
        let (_parent, root, child) = pair();
        root.mount("mnt", &child).unwrap();
        child.close().unwrap();
        assert_eq!(child.state(), ContainerState::ClosePending);
        root.unmount("mnt").unwrap();
        assert_eq!(child.state(), ContainerState::Closed);
    }

    // ---- Test 8: Closing the parent waits for open objects in the child ----
    #[test]
    fn parent_close_waits_for_child_objects() {
        let (parent, root, child) = pair();
        root.mount("mnt", &child).unwrap();
        let inside = root.open_object("/mnt/inside").unwrap();
        root.close().unwrap();

        parent.close().unwrap();
        assert_eq!(parent.state(), ContainerState::ClosePending);
        child.close().unwrap();
        assert_eq!(child.state(), ContainerState::ClosePending);

        inside.close().unwrap();
        assert_eq!(parent.state(), ContainerState::Closed);
        assert_eq!(child.state(), ContainerState::Closed);
        assert!(!child.is_mounted());
    }

    // ---- Test 9: Closing the parent with nothing open tears mounts down ----
    #[test]
    fn parent_close_unmounts() {
        let (parent, root, child) = pair();
        root.mount("mnt", &child).unwrap();
        root.close().unwrap();
        parent.close().unwrap();
        assert!(parent.is_closed());
        assert!(!child.is_mounted());
        // The child was not asked to close.
        assert_eq!(child.state(), ContainerState::Open);
    }
}
