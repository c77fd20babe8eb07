//! Link operations on groups: create, remove, query, move and copy.

use std::collections::HashSet;

use hns_store::HeaderStore;
use hns_types::{Address, IndexType, IterOrder, Link, LinkClassId, LinkTarget, ObjectType};
use tracing::{debug, trace};

use crate::config::LinkCreateProps;
use crate::container::Container;
use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::link::{LinkInfo, LinkValue};
use crate::linkset;
use crate::location::Location;
use crate::object;
use crate::traverse::{traverse, TraverseFlags};

/// Insert `link` into the group at `parent`, counting a hard target's new
/// link and running a user-defined class's create hook.
pub(crate) fn attach(parent: &Location, link: Link) -> NsResult<Link> {
    let c = &parent.container;
    c.ensure_writable()?;
    Link::validate_name(&link.name)?;
    let handler = match &link.target {
        LinkTarget::UserDefined { class, .. } => Some(
            c.link_classes()
                .get(*class)
                .ok_or(NamespaceError::UnknownLinkClass(*class))?,
        ),
        _ => None,
    };
    let hard = link.hard_target();
    let stored = linkset::insert(c, parent.addr, link)?;
    if let Some(target) = hard {
        c.store().adjust_link_count(target, 1)?;
    }
    if let Some(handler) = handler {
        handler.on_create(parent, &stored)?;
    }
    Ok(stored)
}

/// [`attach`] a link to a freshly created object at `addr`, deleting the
/// object again if the link cannot be made.
pub(crate) fn attach_new(parent: &Location, link: Link, addr: Address) -> NsResult<Link> {
    match attach(parent, link) {
        Ok(stored) => Ok(stored),
        Err(e) => {
            object::delete_if_orphan(&parent.container, addr)?;
            Err(e)
        }
    }
}

/// Remove the link `name` from the group at `parent`, releasing a hard
/// target and running a user-defined class's delete hook.
pub(crate) fn detach(parent: &Location, name: &str) -> NsResult<Link> {
    let c = &parent.container;
    c.ensure_writable()?;
    let link = linkset::remove(c, parent.addr, name)?;
    match &link.target {
        LinkTarget::Hard { addr } => object::unlink_target(c, *addr)?,
        LinkTarget::UserDefined { class, .. } => {
            if let Some(handler) = c.link_classes().get(*class) {
                handler.on_delete(parent, &link)?;
            }
        }
        LinkTarget::Soft { .. } | LinkTarget::External { .. } => {}
    }
    Ok(link)
}

fn same_container(parent: &Location, target: &Container) -> NsResult<()> {
    if parent.container.ptr_eq(target) {
        Ok(())
    } else {
        Err(NamespaceError::InvalidArgument(
            "hard links cannot cross containers".into(),
        ))
    }
}

/// Returns `true` if `needle` is `from` or can be reached from it through
/// hard links.
fn reachable(c: &Container, from: Address, needle: Address) -> NsResult<bool> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(addr) = stack.pop() {
        if addr == needle {
            return Ok(true);
        }
        if !seen.insert(addr) || c.store().object_type(addr)? != ObjectType::Group {
            continue;
        }
        let table = linkset::build_table(c, addr, IndexType::Name, IterOrder::Native)?;
        stack.extend(table.iter().filter_map(|l| l.hard_target()));
    }
    Ok(false)
}

impl Group {
    /// Resolve the parent of `path` and insert the link `make` builds
    /// there. Returns the parent and the stored link.
    fn insert_link(
        &self,
        path: &str,
        lcpl: &LinkCreateProps,
        make: impl FnOnce(&Location, &str) -> NsResult<Link>,
    ) -> NsResult<(Location, Link)> {
        self.container().ensure_writable()?;
        let mut flags = TraverseFlags::STOP_AT_LAST;
        if lcpl.create_intermediate_groups {
            flags |= TraverseFlags::CREATE_INTERMEDIATE_GROUPS;
        }
        let mut ctx = self.traverse_ctx();
        traverse(self.location(), path, flags, &mut ctx, |r| {
            if r.link.is_some() {
                return Err(NamespaceError::AlreadyExists { name: r.name });
            }
            Link::validate_name(&r.name)?;
            let mut link = make(&r.parent, &r.name)?;
            link.charset = lcpl.charset;
            let stored = attach(&r.parent, link)?;
            Ok((r.parent, stored))
        })
    }

    /// Create a new object with `make` in the container that will hold its
    /// link and link it at `path`.
    pub(crate) fn create_linked(
        &self,
        path: &str,
        lcpl: &LinkCreateProps,
        make: impl FnOnce(&Container) -> NsResult<Address>,
    ) -> NsResult<Location> {
        self.container().ensure_writable()?;
        let mut flags = TraverseFlags::STOP_AT_LAST;
        if lcpl.create_intermediate_groups {
            flags |= TraverseFlags::CREATE_INTERMEDIATE_GROUPS;
        }
        let mut ctx = self.traverse_ctx();
        traverse(self.location(), path, flags, &mut ctx, |r| {
            if r.link.is_some() {
                return Err(NamespaceError::AlreadyExists { name: r.name });
            }
            Link::validate_name(&r.name)?;
            let addr = make(&r.parent.container)?;
            let mut link = Link::hard(r.name.as_str(), addr);
            link.charset = lcpl.charset;
            attach_new(&r.parent, link, addr)?;
            Ok(r.parent.child(addr, &r.name))
        })
    }

    // -----------------------------------------------------------------
    // Creating links
    // -----------------------------------------------------------------

    /// Make `new_path` a second hard link to the object at `target_path`.
    pub fn link_hard(&self, target_path: &str, new_path: &str) -> NsResult<()> {
        let target = self.resolve(target_path)?;
        self.link_object(new_path, &target)
    }

    /// Make `new_path` a hard link to the object at `target`.
    ///
    /// The target must live in the same container as the new link.
    pub fn link_object(&self, new_path: &str, target: &Location) -> NsResult<()> {
        let (_, link) = self.insert_link(new_path, &LinkCreateProps::default(), |parent, name| {
            same_container(parent, &target.container)?;
            Ok(Link::hard(name, target.addr))
        })?;
        debug!(name = %link.name, target = %target.addr, "hard link created");
        Ok(())
    }

    /// Create a soft link at `new_path` holding `target`.
    ///
    /// The target is not resolved until the link is followed.
    pub fn link_soft(&self, new_path: &str, target: &str) -> NsResult<()> {
        self.link_soft_with(new_path, target, &LinkCreateProps::default())
    }

    pub fn link_soft_with(
        &self,
        new_path: &str,
        target: &str,
        lcpl: &LinkCreateProps,
    ) -> NsResult<()> {
        self.insert_link(new_path, lcpl, |_, name| Ok(Link::soft(name, target)))?;
        debug!(path = new_path, target, "soft link created");
        Ok(())
    }

    /// Create an external link at `new_path` to `path` in the container
    /// named `file`.
    pub fn link_external(&self, new_path: &str, file: &str, path: &str) -> NsResult<()> {
        self.insert_link(new_path, &LinkCreateProps::default(), |_, name| {
            Ok(Link::external(name, file, path))
        })?;
        debug!(path = new_path, file, target = path, "external link created");
        Ok(())
    }

    /// Create a link of the registered user-defined class `class`.
    pub fn link_user_defined(&self, new_path: &str, class: LinkClassId, data: Vec<u8>) -> NsResult<()> {
        self.insert_link(new_path, &LinkCreateProps::default(), |_, name| {
            Ok(Link::user_defined(name, class, data))
        })?;
        debug!(path = new_path, class = %class, "user-defined link created");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Removing links
    // -----------------------------------------------------------------

    /// Remove the link at `path`.
    ///
    /// Removing the last hard link to an object deletes it, or defers the
    /// deletion until its last open handle closes.
    pub fn remove(&self, path: &str) -> NsResult<()> {
        self.container().ensure_writable()?;
        let mut ctx = self.traverse_ctx();
        let link = traverse(
            self.location(),
            path,
            TraverseFlags::STOP_AT_LAST,
            &mut ctx,
            |r| {
                if r.link.is_none() {
                    return Err(NamespaceError::not_found(path));
                }
                detach(&r.parent, &r.name)
            },
        )?;
        trace!(path, kind = %link.kind(), "link removed");
        Ok(())
    }

    /// Remove this group's `n`th link in the given order.
    pub fn remove_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<()> {
        self.container().ensure_writable()?;
        let link = linkset::lookup_by_index(self.container(), self.addr(), index, order, n)?;
        detach(self.location(), &link.name)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// The link stored at `path`, without following it.
    pub fn lookup(&self, path: &str) -> NsResult<Link> {
        let mut ctx = self.traverse_ctx();
        traverse(
            self.location(),
            path,
            TraverseFlags::STOP_AT_LAST,
            &mut ctx,
            |r| r.link.ok_or_else(|| NamespaceError::not_found(path)),
        )
    }

    /// Returns `true` if a link exists at `path`.
    ///
    /// Dangling soft links and missing targets along the way count as
    /// missing rather than as errors.
    pub fn exists(&self, path: &str) -> NsResult<bool> {
        let mut ctx = self.traverse_ctx();
        let flags = TraverseFlags::STOP_AT_LAST_SOFT_LINK
            | TraverseFlags::STOP_AT_LAST_UD_LINK
            | TraverseFlags::EXISTENCE_ONLY;
        match traverse(self.location(), path, flags, &mut ctx, |r| {
            Ok(r.link.is_some() || r.obj.is_some())
        }) {
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Metadata about the link at `path`.
    pub fn link_info(&self, path: &str) -> NsResult<LinkInfo> {
        Ok(LinkInfo::from(&self.lookup(path)?))
    }

    /// The stored value of the soft, external or user-defined link at
    /// `path`.
    pub fn link_value(&self, path: &str) -> NsResult<LinkValue> {
        let link = self.lookup(path)?;
        match link.target {
            LinkTarget::Hard { .. } => Err(NamespaceError::wrong_type(
                path,
                "hard links have no stored value",
            )),
            LinkTarget::Soft { path } => Ok(LinkValue::Soft { path }),
            LinkTarget::External { file, path } => Ok(LinkValue::External { file, path }),
            LinkTarget::UserDefined { class, data } => Ok(LinkValue::UserDefined { class, data }),
        }
    }

    /// This group's `n`th link in the given order.
    pub fn lookup_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<Link> {
        linkset::lookup_by_index(self.container(), self.addr(), index, order, n)
    }

    /// Name of this group's `n`th link in the given order.
    pub fn name_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<String> {
        Ok(self.lookup_by_index(index, order, n)?.name)
    }

    /// Metadata about this group's `n`th link in the given order.
    pub fn link_info_by_index(
        &self,
        index: IndexType,
        order: IterOrder,
        n: u64,
    ) -> NsResult<LinkInfo> {
        Ok(LinkInfo::from(&self.lookup_by_index(index, order, n)?))
    }

    // -----------------------------------------------------------------
    // Move and copy
    // -----------------------------------------------------------------

    /// Move the link at `src` to `dst_path` relative to `dst`.
    ///
    /// A group cannot be moved into its own subtree.
    pub fn move_link(&self, src: &str, dst: &Group, dst_path: &str) -> NsResult<()> {
        self.relink(src, dst, dst_path, true)
    }

    /// Copy the link at `src` to `dst_path` relative to `dst`. Hard links
    /// gain a link to their target; the object itself is not copied.
    pub fn copy_link(&self, src: &str, dst: &Group, dst_path: &str) -> NsResult<()> {
        self.relink(src, dst, dst_path, false)
    }

    fn relink(&self, src: &str, dst: &Group, dst_path: &str, remove_src: bool) -> NsResult<()> {
        self.container().ensure_writable()?;
        let mut ctx = self.traverse_ctx();
        let (src_parent, link) = traverse(
            self.location(),
            src,
            TraverseFlags::STOP_AT_LAST,
            &mut ctx,
            |r| {
                let link = r.link.ok_or_else(|| NamespaceError::not_found(src))?;
                Ok((r.parent, link))
            },
        )?;

        let src_name = link.name.clone();
        let lcpl = LinkCreateProps {
            charset: link.charset,
            ..LinkCreateProps::default()
        };
        let (dst_parent, stored) = dst.insert_link(dst_path, &lcpl, |parent, name| {
            if let Some(target) = link.hard_target() {
                same_container(parent, &src_parent.container)?;
                if remove_src && reachable(&parent.container, target, parent.addr)? {
                    return Err(NamespaceError::InvalidArgument(format!(
                        "cannot move {src} into its own subtree"
                    )));
                }
            }
            Ok(Link {
                name: name.to_string(),
                creation_order: None,
                ..link
            })
        })?;

        if remove_src {
            detach(&src_parent, &src_name)?;
        }
        debug!(
            src,
            dst = %stored.name,
            from = %src_parent.addr,
            to = %dst_parent.addr,
            moved = remove_src,
            "link relinked"
        );
        Ok(())
    }
}
